//! Nextcloud OCS capabilities
//!
//! Only the theming block is read; it gives clients the server's name and colors.

use quick_xml::events::Event;
use quick_xml::Reader;
use serde::{Deserialize, Serialize};

/// Path of the capabilities endpoint below the Nextcloud root
pub const CAPABILITIES_PATH: &str = "ocs/v1.php/cloud/capabilities";

const THEMING_PATH: [&str; 4] = ["ocs", "data", "capabilities", "theming"];

/// Theming information from a server that supports OCS
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcsTheme {
    pub name: Option<String>,
    pub url: Option<String>,
    pub slogan: Option<String>,
    /// Theme color as a hex code starting with `#`
    pub color_hex: Option<String>,
    pub element_color_hex: Option<String>,
    /// Element color for light backgrounds
    pub bright_element_color_hex: Option<String>,
    /// Element color for dark backgrounds
    pub dark_element_color_hex: Option<String>,
    pub logo: Option<String>,
    pub background: Option<String>,
    pub plain_background: Option<String>,
    pub default_background: Option<String>,
}

impl OcsTheme {
    /// Parse the capabilities XML. `None` when there is no theming block.
    pub fn from_xml(body: &[u8]) -> Option<Self> {
        let mut reader = Reader::from_reader(body);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<String> = Vec::new();
        let mut theme: Option<OcsTheme> = None;
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) => {
                    stack.push(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
                    if stack == THEMING_PATH {
                        theme.get_or_insert_with(OcsTheme::default);
                    }
                }
                Ok(Event::Empty(ref e)) => {
                    // <theming/> still counts as a (blank) theme
                    if stack == THEMING_PATH[..3] && e.local_name().as_ref() == b"theming" {
                        theme.get_or_insert_with(OcsTheme::default);
                    }
                }
                Ok(Event::Text(ref e)) => {
                    if stack.len() == THEMING_PATH.len() + 1 && stack[..4] == THEMING_PATH {
                        if let (Some(theme), Some(field)) = (theme.as_mut(), stack.last()) {
                            let text = e.unescape().map(|t| t.into_owned()).unwrap_or_default();
                            theme.set_field(field, text);
                        }
                    }
                }
                Ok(Event::End(_)) => {
                    stack.pop();
                }
                Ok(Event::Eof) | Err(_) => break,
                _ => {}
            }
            buf.clear();
        }

        theme
    }

    fn set_field(&mut self, field: &str, text: String) {
        let value = if text.is_empty() { None } else { Some(text) };
        match field {
            "name" => self.name = value,
            "url" => self.url = value,
            "slogan" => self.slogan = value,
            "color" => self.color_hex = value,
            "color-element" => self.element_color_hex = value,
            "color-element-bright" => self.bright_element_color_hex = value,
            "color-element-dark" => self.dark_element_color_hex = value,
            "logo" => self.logo = value,
            "background" => self.background = value,
            "background-plain" => self.plain_background = value,
            "background-default" => self.default_background = value,
            _ => {}
        }
    }
}
