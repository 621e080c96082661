// ─── .negative Codec ───
// Layout, all integers big-endian:
//
//   magic   8 bytes  "NEGATIVE"
//   name    u16 length, bytes, 0x00
//   icon    u32 length, bytes, 0x00   (length 0 = no icon)
//   mods    reserved, currently empty
//   sha256  32 bytes over everything above

use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::warn;

pub const MAGIC: &[u8; 8] = b"NEGATIVE";
pub const CHECKSUM_LEN: usize = 32;

const TERMINATOR: u8 = 0x00;
const MAX_NAME_LEN: usize = u16::MAX as usize;
const MAX_ICON_LEN: usize = u32::MAX as usize;

/// Structural or integrity failure while parsing an export.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExportError {
    #[error("file is too short ({0} bytes)")]
    TooShort(usize),

    #[error("missing NEGATIVE signature")]
    BadSignature,

    #[error("checksum does not match contents")]
    ChecksumMismatch,

    #[error("{0} length runs past the end of the file")]
    Truncated(&'static str),

    #[error("{0} is not followed by a terminator byte")]
    MissingTerminator(&'static str),

    #[error("{0} is not valid UTF-8")]
    InvalidUtf8(&'static str),

    #[error("{0} unexpected bytes in the reserved mod section")]
    TrailingData(usize),
}

/// The mod section of an export.
///
/// Exports carry no mod data yet; readers reject anything found there
/// until a layout exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModSection {
    #[default]
    Absent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedProfile {
    pub name: String,
    pub icon: Option<String>,
    pub mods: ModSection,
}

impl ExportedProfile {
    pub fn new(name: impl Into<String>, icon: Option<String>) -> Self {
        Self {
            name: name.into(),
            icon,
            mods: ModSection::Absent,
        }
    }
}

pub fn encode(profile: &ExportedProfile) -> Vec<u8> {
    let name = truncate_to_char_boundary(&profile.name, MAX_NAME_LEN);
    if name.len() < profile.name.len() {
        warn!(
            "Profile name truncated from {} to {} bytes for export",
            profile.name.len(),
            name.len()
        );
    }

    let icon = match profile.icon.as_deref() {
        Some(icon) if icon.len() > MAX_ICON_LEN => {
            warn!("Icon of {} bytes is too large to export, dropping it", icon.len());
            ""
        }
        Some(icon) => icon,
        None => "",
    };

    let mut buf =
        Vec::with_capacity(MAGIC.len() + 2 + name.len() + 1 + 4 + icon.len() + 1 + CHECKSUM_LEN);
    buf.extend_from_slice(MAGIC);

    buf.extend_from_slice(&(name.len() as u16).to_be_bytes());
    buf.extend_from_slice(name.as_bytes());
    buf.push(TERMINATOR);

    buf.extend_from_slice(&(icon.len() as u32).to_be_bytes());
    buf.extend_from_slice(icon.as_bytes());
    buf.push(TERMINATOR);

    match profile.mods {
        ModSection::Absent => {}
    }

    let checksum = Sha256::digest(&buf);
    buf.extend_from_slice(&checksum);
    buf
}

/// Verify signature and checksum, then decode the fields.
pub fn parse(bytes: &[u8]) -> Result<ExportedProfile, ExportError> {
    if bytes.len() < MAGIC.len() {
        return Err(ExportError::TooShort(bytes.len()));
    }
    if &bytes[..MAGIC.len()] != MAGIC {
        return Err(ExportError::BadSignature);
    }
    if bytes.len() < MAGIC.len() + CHECKSUM_LEN {
        return Err(ExportError::TooShort(bytes.len()));
    }

    let (body, checksum) = bytes.split_at(bytes.len() - CHECKSUM_LEN);
    if Sha256::digest(body).as_slice() != checksum {
        return Err(ExportError::ChecksumMismatch);
    }

    let mut cursor = Cursor::new(&body[MAGIC.len()..]);

    let name_len = cursor.u16("name")? as usize;
    let name = cursor.string(name_len, "name")?;

    let icon_len = cursor.u32("icon")? as usize;
    let icon = cursor.string(icon_len, "icon")?;

    let rest = cursor.remaining();
    if rest > 0 {
        return Err(ExportError::TrailingData(rest));
    }

    Ok(ExportedProfile {
        name,
        icon: if icon.is_empty() { None } else { Some(icon) },
        mods: ModSection::Absent,
    })
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, len: usize, field: &'static str) -> Result<&'a [u8], ExportError> {
        if len > self.remaining() {
            return Err(ExportError::Truncated(field));
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn u16(&mut self, field: &'static str) -> Result<u16, ExportError> {
        let raw = self.take(2, field)?;
        Ok(u16::from_be_bytes([raw[0], raw[1]]))
    }

    fn u32(&mut self, field: &'static str) -> Result<u32, ExportError> {
        let raw = self.take(4, field)?;
        Ok(u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    /// `len` bytes of UTF-8 followed by the terminator.
    fn string(&mut self, len: usize, field: &'static str) -> Result<String, ExportError> {
        let raw = self.take(len, field)?;
        match self.take(1, field) {
            Ok([TERMINATOR]) => {}
            _ => return Err(ExportError::MissingTerminator(field)),
        }
        String::from_utf8(raw.to_vec()).map_err(|_| ExportError::InvalidUtf8(field))
    }
}

fn truncate_to_char_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Append a valid checksum to a hand-built body.
    fn seal(mut body: Vec<u8>) -> Vec<u8> {
        let checksum = Sha256::digest(&body);
        body.extend_from_slice(&checksum);
        body
    }

    #[test]
    fn byte_layout_is_stable() {
        let bytes = encode(&ExportedProfile::new("ab", Some("x".into())));

        let mut expected = b"NEGATIVE".to_vec();
        expected.extend_from_slice(&[0x00, 0x02, b'a', b'b', 0x00]);
        expected.extend_from_slice(&[0x00, 0x00, 0x00, 0x01, b'x', 0x00]);
        assert_eq!(&bytes[..bytes.len() - CHECKSUM_LEN], expected.as_slice());
        assert_eq!(bytes, seal(expected));
    }

    #[test]
    fn parse_recovers_name_and_icon() {
        let profile = ExportedProfile::new("Cryptid Run", Some("data:image/png;base64,AAAA".into()));
        assert_eq!(parse(&encode(&profile)).unwrap(), profile);

        let no_icon = ExportedProfile::new("Vanilla+", None);
        assert_eq!(parse(&encode(&no_icon)).unwrap(), no_icon);
    }

    #[test]
    fn any_flipped_checksum_byte_is_rejected() {
        let bytes = encode(&ExportedProfile::new("Default", None));
        for i in bytes.len() - CHECKSUM_LEN..bytes.len() {
            let mut corrupt = bytes.clone();
            corrupt[i] ^= 0x01;
            assert_eq!(parse(&corrupt), Err(ExportError::ChecksumMismatch));
        }
    }

    #[test]
    fn flipped_body_byte_is_rejected() {
        let mut bytes = encode(&ExportedProfile::new("Default", None));
        bytes[MAGIC.len() + 3] ^= 0x20;
        assert_eq!(parse(&bytes), Err(ExportError::ChecksumMismatch));
    }

    #[test]
    fn truncated_files_are_rejected() {
        let bytes = encode(&ExportedProfile::new("Default", Some("icon".into())));
        assert_eq!(parse(&bytes[..4]), Err(ExportError::TooShort(4)));
        assert_eq!(parse(&bytes[..20]), Err(ExportError::TooShort(20)));
        assert_eq!(
            parse(&bytes[..bytes.len() - 1]),
            Err(ExportError::ChecksumMismatch)
        );
    }

    #[test]
    fn wrong_signature_is_rejected() {
        let mut bytes = encode(&ExportedProfile::new("Default", None));
        bytes[0] = b'P';
        assert_eq!(parse(&bytes), Err(ExportError::BadSignature));
    }

    #[test]
    fn length_past_end_is_a_parse_failure() {
        let mut body = MAGIC.to_vec();
        body.extend_from_slice(&u16::MAX.to_be_bytes());
        body.extend_from_slice(b"short\0");
        assert_eq!(parse(&seal(body)), Err(ExportError::Truncated("name")));

        let mut body = MAGIC.to_vec();
        body.extend_from_slice(&[0x00, 0x01, b'a', 0x00]);
        body.extend_from_slice(&u32::MAX.to_be_bytes());
        assert_eq!(parse(&seal(body)), Err(ExportError::Truncated("icon")));
    }

    #[test]
    fn missing_terminator_is_rejected() {
        let mut body = MAGIC.to_vec();
        body.extend_from_slice(&[0x00, 0x01, b'a', b'!']);
        body.extend_from_slice(&[0x00, 0x00, 0x00, 0x00, 0x00]);
        assert_eq!(
            parse(&seal(body)),
            Err(ExportError::MissingTerminator("name"))
        );
    }

    #[test]
    fn bytes_in_reserved_mod_section_are_rejected() {
        let bytes = encode(&ExportedProfile::new("Default", None));
        let mut body = bytes[..bytes.len() - CHECKSUM_LEN].to_vec();
        body.extend_from_slice(b"mods");
        assert_eq!(parse(&seal(body)), Err(ExportError::TrailingData(4)));
    }

    #[test]
    fn long_names_are_truncated_on_a_char_boundary() {
        let ascii = "a".repeat(70_000);
        let parsed = parse(&encode(&ExportedProfile::new(ascii, None))).unwrap();
        assert_eq!(parsed.name.len(), 65_535);

        // Two-byte chars: 65535 is mid-char, so one byte less survives.
        let wide = "é".repeat(40_000);
        let parsed = parse(&encode(&ExportedProfile::new(wide, None))).unwrap();
        assert_eq!(parsed.name.len(), 65_534);
        assert!(parsed.name.chars().all(|c| c == 'é'));
    }
}
