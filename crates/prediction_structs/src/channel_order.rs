use core::str::FromStr;

/// Order of the colour planes handed to an image model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ChannelOrder {
    Rgb,
    /// OpenCV's native decode order.
    #[default]
    Bgr,
}

impl FromStr for ChannelOrder {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "rgb" => Ok(Self::Rgb),
            "bgr" => Ok(Self::Bgr),
            _ => Err(anyhow::anyhow!("Invalid channel order: {s}")),
        }
    }
}
