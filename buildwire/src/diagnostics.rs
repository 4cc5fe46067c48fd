//! Diagnostics attached to build and transform results.

use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub file: String,
    pub namespace: String,
    /// 1-based.
    pub line: i32,
    /// 0-based, in bytes.
    pub column: i32,
    pub length: i32,
    pub line_text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Message {
    pub text: String,
    pub location: Option<Location>,
}

impl Message {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            location: None,
        }
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    /// Render for a terminal, e.g.
    ///
    /// ```text
    /// src/a.js:3:4: error: Unexpected "}"
    /// let x = };
    ///         ^
    /// ```
    pub fn render(&self, kind: &str) -> String {
        let Some(loc) = &self.location else {
            return format!("{kind}: {}\n", self.text);
        };

        let mut out = format!(
            "{}:{}:{}: {kind}: {}\n",
            loc.file, loc.line, loc.column, self.text
        );
        if !loc.line_text.is_empty() {
            let column = usize::try_from(loc.column).unwrap_or(0);
            let extra = usize::try_from(loc.length).unwrap_or(0).saturating_sub(1);
            out.push_str(&loc.line_text);
            out.push('\n');
            out.push_str(&" ".repeat(column));
            out.push('^');
            out.push_str(&"~".repeat(extra));
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_without_location() {
        assert_eq!(Message::new("boom").render("error"), "error: boom\n");
    }

    #[test]
    fn render_with_location_underlines_span() {
        let msg = Message::new("Unexpected \"}\"").with_location(Location {
            file: "a.js".into(),
            namespace: "file".into(),
            line: 3,
            column: 8,
            length: 2,
            line_text: "let x = };".into(),
        });
        assert_eq!(
            msg.render("error"),
            "a.js:3:8: error: Unexpected \"}\"\nlet x = };\n        ^~\n"
        );
    }
}
