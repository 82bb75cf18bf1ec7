// Output formatting for CLI

use anyhow::Result;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
    Yaml,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Self {
        match s {
            "json" => OutputFormat::Json,
            "yaml" => OutputFormat::Yaml,
            _ => OutputFormat::Text,
        }
    }

    pub fn render<T: Serialize>(&self, value: &T) -> Result<Option<String>> {
        match self {
            OutputFormat::Json => Ok(Some(serde_json::to_string_pretty(value)?)),
            OutputFormat::Yaml => Ok(Some(serde_yaml::to_string(value)?)),
            // Text format is handled by each command
            OutputFormat::Text => Ok(None),
        }
    }

    pub fn print_value<T: Serialize>(&self, value: &T) -> Result<()> {
        if let Some(rendered) = self.render(value)? {
            println!("{}", rendered.trim_end());
        }
        Ok(())
    }

    pub fn is_text(&self) -> bool {
        matches!(self, OutputFormat::Text)
    }
}

/// Print a simple key-value pair for text output
pub fn print_field(label: &str, value: &str) {
    println!("{:<14} {}", format!("{}:", label), value);
}

/// Print a table header
pub fn print_table_header(columns: &[(&str, usize)]) {
    let header: String = columns
        .iter()
        .map(|(name, width)| format!("{:<width$}", name, width = width))
        .collect::<Vec<_>>()
        .join("  ");
    println!("{}", header);
}

/// Truncate to `width` characters, marking the cut with "..."
pub fn truncate(value: &str, width: usize) -> String {
    if value.chars().count() <= width {
        return value.to_string();
    }
    let keep = width.saturating_sub(3);
    let mut cut: String = value.chars().take(keep).collect();
    cut.push_str("...");
    cut
}

/// Print a table row
pub fn print_table_row(values: &[(&str, usize)]) {
    let row: String = values
        .iter()
        .map(|(val, width)| format!("{:<width$}", truncate(val, *width), width = width))
        .collect::<Vec<_>>()
        .join("  ");
    println!("{}", row);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_str_defaults_to_text() {
        assert_eq!(OutputFormat::from_str("json"), OutputFormat::Json);
        assert_eq!(OutputFormat::from_str("yaml"), OutputFormat::Yaml);
        assert_eq!(OutputFormat::from_str("xml"), OutputFormat::Text);
    }

    #[test]
    fn test_render() {
        let value = json!({"unread": 3});
        assert_eq!(OutputFormat::Text.render(&value).unwrap(), None);
        assert!(OutputFormat::Json
            .render(&value)
            .unwrap()
            .unwrap()
            .contains("\"unread\": 3"));
        assert_eq!(
            OutputFormat::Yaml.render(&value).unwrap().unwrap().trim(),
            "unread: 3"
        );
    }

    #[test]
    fn test_truncate_is_char_safe() {
        assert_eq!(truncate("Merlot", 10), "Merlot");
        assert_eq!(truncate("Châteauneuf-du-Pape", 10), "Château...");
        assert_eq!(truncate("Châteauneuf-du-Pape", 10).chars().count(), 10);
    }
}
