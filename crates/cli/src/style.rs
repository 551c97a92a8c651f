//! Terminal styling for status lines and tables.

use console::{style, Style};

fn marked(mark: &str, colour: Style, msg: &str) -> String {
    format!("{} {}", colour.apply_to(mark), msg)
}

pub fn success(msg: &str) -> String {
    marked("✓", Style::new().green(), msg)
}

pub fn error(msg: &str) -> String {
    marked("✗", Style::new().red().bold(), msg)
}

pub fn warn(msg: &str) -> String {
    marked("!", Style::new().yellow().bold(), msg)
}

pub fn header(msg: &str) -> String {
    style(msg).bold().underlined().to_string()
}

pub fn dim(msg: &str) -> String {
    style(msg).dim().to_string()
}

/// Yes/no cell for status tables; "yes" stands out.
pub fn flag(set: bool) -> String {
    if set {
        style("yes").yellow().to_string()
    } else {
        dim("no")
    }
}
