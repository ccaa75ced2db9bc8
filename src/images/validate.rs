//! Poster MIME detection and header validation.
//!
//! Only the four formats Telegram renders as photos are accepted. Validation
//! parses just enough of each header to find non-zero image dimensions.

/// Accepted poster formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageMime {
    Jpeg,
    Png,
    Gif,
    Webp,
}

impl ImageMime {
    /// Parses a `Content-Type` value, ignoring parameters and case.
    #[must_use]
    pub fn from_content_type(value: &str) -> Option<Self> {
        let essence = value.split(';').next().unwrap_or_default().trim();
        match essence.to_ascii_lowercase().as_str() {
            "image/jpeg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            "image/gif" => Some(Self::Gif),
            "image/webp" => Some(Self::Webp),
            _ => None,
        }
    }

    /// Detects the format from leading magic bytes.
    #[must_use]
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(Self::Jpeg)
        } else if bytes.starts_with(PNG_SIGNATURE) {
            Some(Self::Png)
        } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
            Some(Self::Gif)
        } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
            Some(Self::Webp)
        } else {
            None
        }
    }

    /// Canonical MIME string
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::Webp => "image/webp",
        }
    }

    /// File extension used for the uploaded file name
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => ".jpg",
            Self::Png => ".png",
            Self::Gif => ".gif",
            Self::Webp => ".webp",
        }
    }
}

const PNG_SIGNATURE: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Width and height read from an image header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Decodes the header of `bytes` as `mime`, returning its dimensions.
///
/// # Errors
///
/// Returns a short reason when the header is missing, truncated, or
/// describes an empty image.
pub fn decode_header(mime: ImageMime, bytes: &[u8]) -> Result<Dimensions, &'static str> {
    let dims = match mime {
        ImageMime::Png => png_dimensions(bytes)?,
        ImageMime::Jpeg => jpeg_dimensions(bytes)?,
        ImageMime::Gif => gif_dimensions(bytes)?,
        ImageMime::Webp => webp_dimensions(bytes)?,
    };
    if dims.width == 0 || dims.height == 0 {
        return Err("zero image dimensions");
    }
    Ok(dims)
}

fn be_u16(bytes: &[u8], at: usize) -> Option<u32> {
    let b = bytes.get(at..at + 2)?;
    Some(u32::from(u16::from_be_bytes([b[0], b[1]])))
}

fn be_u32(bytes: &[u8], at: usize) -> Option<u32> {
    let b = bytes.get(at..at + 4)?;
    Some(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

fn le_u16(bytes: &[u8], at: usize) -> Option<u32> {
    let b = bytes.get(at..at + 2)?;
    Some(u32::from(u16::from_le_bytes([b[0], b[1]])))
}

fn le_u24(bytes: &[u8], at: usize) -> Option<u32> {
    let b = bytes.get(at..at + 3)?;
    Some(u32::from(b[0]) | (u32::from(b[1]) << 8) | (u32::from(b[2]) << 16))
}

fn png_dimensions(bytes: &[u8]) -> Result<Dimensions, &'static str> {
    if !bytes.starts_with(PNG_SIGNATURE) {
        return Err("missing PNG signature");
    }
    if bytes.get(12..16) != Some(b"IHDR".as_slice()) {
        return Err("missing PNG IHDR chunk");
    }
    let width = be_u32(bytes, 16).ok_or("truncated PNG header")?;
    let height = be_u32(bytes, 20).ok_or("truncated PNG header")?;
    Ok(Dimensions { width, height })
}

fn gif_dimensions(bytes: &[u8]) -> Result<Dimensions, &'static str> {
    if !(bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a")) {
        return Err("missing GIF signature");
    }
    let width = le_u16(bytes, 6).ok_or("truncated GIF header")?;
    let height = le_u16(bytes, 8).ok_or("truncated GIF header")?;
    Ok(Dimensions { width, height })
}

fn jpeg_dimensions(bytes: &[u8]) -> Result<Dimensions, &'static str> {
    if !bytes.starts_with(&[0xFF, 0xD8]) {
        return Err("missing JPEG SOI marker");
    }

    let mut pos = 2;
    loop {
        // Skip fill bytes preceding a marker
        while bytes.get(pos) == Some(&0xFF) && bytes.get(pos + 1) == Some(&0xFF) {
            pos += 1;
        }
        if bytes.get(pos) != Some(&0xFF) {
            return Err("malformed JPEG marker");
        }
        let marker = *bytes.get(pos + 1).ok_or("truncated JPEG")?;
        pos += 2;

        match marker {
            // Standalone markers carry no length
            0x01 | 0xD0..=0xD7 => continue,
            0xD9 | 0xDA => return Err("JPEG has no frame header"),
            0xC0..=0xC3 | 0xC5..=0xC7 | 0xC9..=0xCB | 0xCD..=0xCF => {
                let height = be_u16(bytes, pos + 3).ok_or("truncated JPEG frame header")?;
                let width = be_u16(bytes, pos + 5).ok_or("truncated JPEG frame header")?;
                return Ok(Dimensions { width, height });
            }
            _ => {
                let len = be_u16(bytes, pos).ok_or("truncated JPEG segment")?;
                if len < 2 {
                    return Err("invalid JPEG segment length");
                }
                pos += len as usize;
            }
        }
    }
}

fn webp_dimensions(bytes: &[u8]) -> Result<Dimensions, &'static str> {
    if bytes.len() < 30 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WEBP" {
        return Err("missing WebP RIFF header");
    }

    match &bytes[12..16] {
        b"VP8 " => {
            if bytes[23..26] != [0x9D, 0x01, 0x2A] {
                return Err("missing VP8 start code");
            }
            let width = le_u16(bytes, 26).ok_or("truncated VP8 header")? & 0x3FFF;
            let height = le_u16(bytes, 28).ok_or("truncated VP8 header")? & 0x3FFF;
            Ok(Dimensions { width, height })
        }
        b"VP8L" => {
            if bytes[20] != 0x2F {
                return Err("missing VP8L signature");
            }
            let bits = u32::from_le_bytes([bytes[21], bytes[22], bytes[23], bytes[24]]);
            Ok(Dimensions {
                width: (bits & 0x3FFF) + 1,
                height: ((bits >> 14) & 0x3FFF) + 1,
            })
        }
        b"VP8X" => {
            let width = le_u24(bytes, 24).ok_or("truncated VP8X header")? + 1;
            let height = le_u24(bytes, 27).ok_or("truncated VP8X header")? + 1;
            Ok(Dimensions { width, height })
        }
        _ => Err("unknown WebP chunk"),
    }
}

/// Builders for minimal valid headers, shared with the service tests.
#[cfg(test)]
pub(crate) mod fixtures {
    /// PNG signature plus IHDR for a `w`x`h` image, padded to `len` bytes
    pub fn png(w: u32, h: u32, len: usize) -> Vec<u8> {
        let mut out = super::PNG_SIGNATURE.to_vec();
        out.extend_from_slice(&13u32.to_be_bytes());
        out.extend_from_slice(b"IHDR");
        out.extend_from_slice(&w.to_be_bytes());
        out.extend_from_slice(&h.to_be_bytes());
        out.extend_from_slice(&[8, 6, 0, 0, 0]);
        out.resize(len.max(out.len()), 0);
        out
    }

    /// JPEG with an APP0 segment followed by a baseline SOF0
    pub fn jpeg(w: u16, h: u16, len: usize) -> Vec<u8> {
        let mut out = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];
        out.extend_from_slice(b"JFIF\0");
        out.extend_from_slice(&[1, 1, 0, 0, 1, 0, 1, 0, 0]);
        out.extend_from_slice(&[0xFF, 0xC0, 0x00, 0x11, 0x08]);
        out.extend_from_slice(&h.to_be_bytes());
        out.extend_from_slice(&w.to_be_bytes());
        out.extend_from_slice(&[3, 1, 0x22, 0, 2, 0x11, 1, 3, 0x11, 1]);
        out.resize(len.max(out.len()), 0);
        out
    }
}
