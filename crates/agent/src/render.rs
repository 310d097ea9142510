//! Presents populated bundles as text, JSON, YAML or a user template.
use clap::ValueEnum;
use crossterm::style::Stylize;
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use sysinfo::System;
use tera::{Context, Tera, Value};
use thiserror::Error;

use netcheck_common::{split_host_port, Bundle};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Yaml,
    Template,
}

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
    #[error("failed to serialize results as JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to serialize results as YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("template output needs a template file")]
    MissingTemplate,
    #[error("failed to read template {path}: {source}")]
    TemplateRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to render template: {0}")]
    Template(#[from] tera::Error),
}

/// Name of the machine the checks ran from, as shown in text output.
pub fn source_host() -> String {
    System::host_name().unwrap_or_else(|| "localhost".to_string())
}

/// Writes one bundle as a header line followed by one line per check.
pub fn render_text(
    bundle: &Bundle,
    source: &str,
    colour: bool,
    out: &mut impl Write,
) -> io::Result<()> {
    if colour {
        writeln!(out, "{} {}", "►".yellow(), bundle.id)?;
    } else {
        writeln!(out, "► {}", bundle.id)?;
    }

    for check in &bundle.checks {
        let (target, port) = split_host_port(&check.address);
        let port = port.unwrap_or("-");
        let protocol = check.protocol.as_str();
        let failure = check
            .outcome
            .as_ref()
            .filter(|outcome| !outcome.is_success());

        match (failure, colour) {
            (Some(outcome), true) => writeln!(
                out,
                "{} {} {} : {source} → {target} {}",
                "▼".red(),
                format!("{port:>5}").cyan(),
                format!("{protocol:<4}").magenta(),
                format!("({outcome})").blue(),
            )?,
            (Some(outcome), false) => writeln!(
                out,
                "▼ {port:>5} {protocol:<4} : {source} → {target} ({outcome})"
            )?,
            (None, true) => writeln!(
                out,
                "{} {} {} : {source} → {target}",
                "▲".green(),
                format!("{port:>5}").cyan(),
                format!("{protocol:<4}").magenta(),
            )?,
            (None, false) => writeln!(out, "▲ {port:>5} {protocol:<4} : {source} → {target}")?,
        }
    }
    Ok(())
}

fn colour_filter(
    paint: fn(String) -> String,
) -> impl Fn(&Value, &HashMap<String, Value>) -> tera::Result<Value> + Sync + Send {
    move |value, _| {
        let text = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        Ok(Value::String(paint(text)))
    }
}

/// Renders `bundles` through the tera template at `path`. The template sees
/// them as `bundles` and may use the `red`, `green`, `yellow`, `blue`,
/// `magenta`, `cyan` and `white` filters.
pub fn render_template(
    bundles: &[Bundle],
    path: &Path,
    out: &mut impl Write,
) -> Result<(), RenderError> {
    let source = std::fs::read_to_string(path).map_err(|source| RenderError::TemplateRead {
        path: path.to_path_buf(),
        source,
    })?;

    let mut tera = Tera::default();
    tera.add_raw_template("bundles", &source)?;
    tera.register_filter("red", colour_filter(|s| s.red().to_string()));
    tera.register_filter("green", colour_filter(|s| s.green().to_string()));
    tera.register_filter("yellow", colour_filter(|s| s.yellow().to_string()));
    tera.register_filter("blue", colour_filter(|s| s.blue().to_string()));
    tera.register_filter("magenta", colour_filter(|s| s.magenta().to_string()));
    tera.register_filter("cyan", colour_filter(|s| s.cyan().to_string()));
    tera.register_filter("white", colour_filter(|s| s.white().to_string()));

    let mut context = Context::new();
    context.insert("bundles", bundles);
    let rendered = tera.render("bundles", &context)?;
    out.write_all(rendered.as_bytes())?;
    Ok(())
}

/// Writes every bundle in the requested format.
pub fn render(
    bundles: &[Bundle],
    format: OutputFormat,
    template: Option<&Path>,
    colour: bool,
    out: &mut impl Write,
) -> Result<(), RenderError> {
    match format {
        OutputFormat::Text => {
            let source = source_host();
            for bundle in bundles {
                render_text(bundle, &source, colour, out)?;
            }
        }
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *out, bundles)?;
            writeln!(out)?;
        }
        OutputFormat::Yaml => {
            serde_yaml::to_writer(&mut *out, bundles)?;
        }
        OutputFormat::Template => {
            let path = template.ok_or(RenderError::MissingTemplate)?;
            render_template(bundles, path, out)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use netcheck_common::{Check, Outcome, ProbeError, Protocol};

    fn sample() -> Bundle {
        let mut up = Check::new(Protocol::Tcp, "db.example:5432");
        up.record(Outcome::Success, Vec::new());
        let mut down = Check::new(Protocol::Icmp, "10.0.0.9");
        down.record(
            Outcome::Failure(ProbeError::Echo {
                address: "10.0.0.9".to_string(),
                reason: "network unreachable".to_string(),
            }),
            Vec::new(),
        );
        Bundle {
            id: "core".to_string(),
            checks: vec![up, down],
            ..Bundle::default()
        }
    }

    #[test]
    fn plain_text_lists_each_check() {
        let mut out = Vec::new();
        render_text(&sample(), "probe-host", false, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "► core");
        assert_eq!(lines[1], "▲  5432 tcp  : probe-host → db.example");
        assert_eq!(
            lines[2],
            "▼     - icmp : probe-host → 10.0.0.9 (error running ping against 10.0.0.9: network unreachable)"
        );
    }

    #[test]
    fn json_output_carries_results() {
        let mut out = Vec::new();
        render(&[sample()], OutputFormat::Json, None, false, &mut out).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value[0]["id"], "core");
        assert_eq!(value[0]["checks"][0]["result"], "success");
        assert_eq!(value[0]["checks"][1]["protocol"], "icmp");
        assert_eq!(value[0]["checks"][1]["cause"], "echo");
        assert!(value[0]["checks"][0].get("cause").is_none());
    }

    #[test]
    fn template_sees_bundles() {
        let mut template = tempfile::NamedTempFile::new().unwrap();
        write!(
            template,
            "{{% for b in bundles %}}{{{{ b.id }}}}:{{% for c in b.checks %}} {{{{ c.result }}}}{{% endfor %}}{{% endfor %}}"
        )
        .unwrap();

        let mut out = Vec::new();
        render(&[sample()], OutputFormat::Template, Some(template.path()), false, &mut out)
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("core: success error running ping"));
    }

    #[test]
    fn template_output_requires_a_template() {
        let error = render(&[sample()], OutputFormat::Template, None, false, &mut Vec::new())
            .unwrap_err();
        assert!(matches!(error, RenderError::MissingTemplate));
    }
}
