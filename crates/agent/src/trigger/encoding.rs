use encoding_rs::Encoding;
use lazy_static::lazy_static;

#[cfg(windows)]
use windows_sys::Win32::Globalization::GetACP;

lazy_static! {
    /// The code page trigger commands most likely write in when they do not
    /// write UTF-8.
    static ref SYSTEM_ENCODING: &'static Encoding = {
        #[cfg(windows)]
        {
            let acp = unsafe { GetACP() };
            u16::try_from(acp)
                .ok()
                .and_then(codepage::to_encoding)
                .unwrap_or(encoding_rs::UTF_8)
        }
        #[cfg(not(windows))]
        {
            encoding_rs::UTF_8
        }
    };
}

/// Turns captured command output into text.
///
/// UTF-8 is tried first, then the system code page, and finally a lossy
/// UTF-8 conversion so that no output is ever dropped.
pub fn decode_output(bytes: &[u8]) -> String {
    if let Ok(text) = std::str::from_utf8(bytes) {
        return text.to_string();
    }

    if *SYSTEM_ENCODING != encoding_rs::UTF_8 {
        let (text, _, had_errors) = SYSTEM_ENCODING.decode(bytes);
        if !had_errors {
            return text.into_owned();
        }
    }

    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_utf8_as_is() {
        assert_eq!(decode_output("héllo\n".as_bytes()), "héllo\n");
        assert_eq!(decode_output(b""), "");
    }

    #[cfg(not(windows))]
    #[test]
    fn invalid_bytes_are_replaced() {
        assert_eq!(decode_output(b"ok \xff\xfe done"), "ok \u{fffd}\u{fffd} done");
    }
}
