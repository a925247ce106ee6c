//! Process-wide config document, per spec §6: fetched from `/config`,
//! transport-agnostic like the streams above.

use serde::{Deserialize, Serialize};

/// The `colors` object of the `/config` document. Applied as CSS-visible
/// variables by the host embedder; luminance here drives contrast choices
/// for overlays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorScheme {
    pub background: String,
    pub foreground: String,
    pub palette0: String,
    pub palette1: String,
    pub palette2: String,
    pub palette3: String,
    pub palette4: String,
    pub palette5: String,
    pub palette6: String,
    pub palette7: String,
    pub palette8: String,
    pub palette9: String,
    pub palette10: String,
    pub palette11: String,
    pub palette12: String,
    pub palette13: String,
    pub palette14: String,
    pub palette15: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub colors: ColorScheme,
}

impl ClientConfig {
    /// Parse a `/config` response body. Transport-agnostic: the caller
    /// fetches the bytes however it likes (HTTP client, test fixture).
    pub fn from_json(bytes: &[u8]) -> crate::error::Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| crate::error::Error::protocol(format!("malformed config document: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_json() -> serde_json::Value {
        serde_json::json!({
            "colors": {
                "background": "#000000",
                "foreground": "#ffffff",
                "palette0": "#000000", "palette1": "#ff0000", "palette2": "#00ff00", "palette3": "#ffff00",
                "palette4": "#0000ff", "palette5": "#ff00ff", "palette6": "#00ffff", "palette7": "#ffffff",
                "palette8": "#808080", "palette9": "#ff8080", "palette10": "#80ff80", "palette11": "#ffff80",
                "palette12": "#8080ff", "palette13": "#ff80ff", "palette14": "#80ffff", "palette15": "#ffffff"
            }
        })
    }

    #[test]
    fn config_parses_colors() {
        let bytes = serde_json::to_vec(&sample_json()).unwrap();
        let config = ClientConfig::from_json(&bytes).unwrap();
        assert_eq!(config.colors.background, "#000000");
        assert_eq!(config.colors.palette15, "#ffffff");
    }

    #[test]
    fn malformed_config_is_a_protocol_error() {
        let err = ClientConfig::from_json(b"not json").unwrap_err();
        assert_eq!(err.tag(), crate::error::ErrorTag::Protocol);
    }
}
