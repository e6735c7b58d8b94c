use crate::abi::AbiRegistry;
use crate::constants::ENUM_COLOR;
use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};

/// The closed set of colors a pixel can take on chain. The discriminant
/// mapping is validated against the deployed contract ABI at startup; a
/// mismatch is a configuration error, never silently defaulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelColor {
    Red,
    Blue,
    Yellow,
    Purple,
    White,
    Black,
}

impl PixelColor {
    pub const ALL: [PixelColor; 6] = [
        PixelColor::Red,
        PixelColor::Blue,
        PixelColor::Yellow,
        PixelColor::Purple,
        PixelColor::White,
        PixelColor::Black,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PixelColor::Red => "Red",
            PixelColor::Blue => "Blue",
            PixelColor::Yellow => "Yellow",
            PixelColor::Purple => "Purple",
            PixelColor::White => "White",
            PixelColor::Black => "Black",
        }
    }

    pub fn hex(&self) -> &'static str {
        match self {
            PixelColor::Red => "#FF0000",
            PixelColor::Blue => "#0000FF",
            PixelColor::Yellow => "#FFFF00",
            PixelColor::Purple => "#800080",
            PixelColor::White => "#FFFFFF",
            PixelColor::Black => "#000000",
        }
    }

    pub fn discriminant(&self) -> u8 {
        match self {
            PixelColor::Red => 0,
            PixelColor::Blue => 1,
            PixelColor::Yellow => 2,
            PixelColor::Purple => 3,
            PixelColor::White => 4,
            PixelColor::Black => 5,
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|color| color.name() == name)
            .ok_or_else(|| AppError::Configuration(format!("unknown pixel color {name}")))
    }

    /// Every color must exist in the ABI enum with the discriminant this
    /// process assumes. Called once at startup.
    pub fn validate_against(registry: &AbiRegistry) -> Result<()> {
        for color in Self::ALL {
            let declared = registry.discriminant_of(ENUM_COLOR, color.name())?;
            if declared != color.discriminant() {
                return Err(AppError::Configuration(format!(
                    "ABI discriminant mismatch for color {}: expected {}, ABI declares {declared}",
                    color.name(),
                    color.discriminant()
                )));
            }
        }
        Ok(())
    }
}

/// One cell of the local grid view, keyed by `(x, y)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelRecord {
    pub x: u32,
    pub y: u32,
    pub address: String,
    pub color: PixelColor,
    pub played_count: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PixelResponse {
    pub x: u32,
    pub y: u32,
    pub address: String,
    pub color: PixelColor,
    pub played_count: u32,
}

impl From<PixelRecord> for PixelResponse {
    fn from(record: PixelRecord) -> Self {
        Self {
            x: record.x,
            y: record.y,
            address: record.address,
            color: record.color,
            played_count: record.played_count,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PixelInfosResponse {
    pub x: u32,
    pub y: u32,
    pub price_to_change: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableColorResponse {
    pub color_hex: String,
    pub discriminant: u8,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PixelConfigResponse {
    pub available_colors: Vec<AvailableColorResponse>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_names_round_trip() {
        for color in PixelColor::ALL {
            assert_eq!(PixelColor::from_name(color.name()).unwrap(), color);
        }
    }

    #[test]
    fn unknown_color_name_is_rejected() {
        assert!(PixelColor::from_name("Green").is_err());
    }

    #[test]
    fn discriminants_match_embedded_abi() {
        let registry = AbiRegistry::from_embedded().unwrap();
        assert!(PixelColor::validate_against(&registry).is_ok());
    }

    #[test]
    fn hex_mapping_is_total_and_distinct() {
        let mut seen = std::collections::HashSet::new();
        for color in PixelColor::ALL {
            assert!(color.hex().starts_with('#'));
            assert!(seen.insert(color.hex()));
        }
    }
}
