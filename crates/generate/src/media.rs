/// Raster formats recognised by their magic bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    Webp,
}

impl ImageFormat {
    /// Identifies `bytes`, assuming JPEG when nothing matches since that is
    /// what the image host serves for covers and inline images.
    pub fn sniff(bytes: &[u8]) -> Self {
        match bytes {
            [0x89, b'P', b'N', b'G', ..] => Self::Png,
            [b'G', b'I', b'F', b'8', ..] => Self::Gif,
            [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Self::Webp,
            _ => Self::Jpeg,
        }
    }

    pub fn media_type(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::Webp => "image/webp",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::Webp => "webp",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(&[0xFF, 0xD8, 0xFF, 0xE0], ImageFormat::Jpeg)]
    #[case(b"\x89PNG\r\n\x1a\n", ImageFormat::Png)]
    #[case(b"GIF89a", ImageFormat::Gif)]
    #[case(b"RIFF\0\0\0\0WEBPVP8 ", ImageFormat::Webp)]
    #[case(b"", ImageFormat::Jpeg)]
    fn sniffs(#[case] bytes: &[u8], #[case] expected: ImageFormat) {
        assert_eq!(ImageFormat::sniff(bytes), expected);
    }
}
