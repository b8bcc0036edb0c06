use image::GrayImage;

pub(crate) const MIN_WIDTH: u32 = 500;
pub(crate) const MIN_HEIGHT: u32 = 700;
const MIN_BRIGHTNESS: f64 = 50.0;
const MAX_BRIGHTNESS: f64 = 200.0;

pub(crate) const TOO_SMALL: &str = "Image is too small. Minimum dimensions: 500x700 pixels";
pub(crate) const TOO_DARK: &str = "Image is too dark";
pub(crate) const TOO_BRIGHT: &str = "Image is too bright";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum QualityVerdict {
    Acceptable,
    Rejected(&'static str),
}

impl QualityVerdict {
    pub(crate) fn is_acceptable(&self) -> bool {
        matches!(self, Self::Acceptable)
    }
}

pub(crate) fn assess(gray: &GrayImage) -> QualityVerdict {
    let (width, height) = gray.dimensions();
    if width < MIN_WIDTH || height < MIN_HEIGHT {
        return QualityVerdict::Rejected(TOO_SMALL);
    }

    let brightness = mean_brightness(gray);
    if brightness < MIN_BRIGHTNESS {
        return QualityVerdict::Rejected(TOO_DARK);
    }
    if brightness > MAX_BRIGHTNESS {
        return QualityVerdict::Rejected(TOO_BRIGHT);
    }

    QualityVerdict::Acceptable
}

fn mean_brightness(gray: &GrayImage) -> f64 {
    let pixels = u64::from(gray.width()) * u64::from(gray.height());
    if pixels == 0 {
        return 0.0;
    }
    let total: u64 = gray.pixels().map(|pixel| u64::from(pixel[0])).sum();
    total as f64 / pixels as f64
}
