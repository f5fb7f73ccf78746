use console::{Emoji, style};

pub static SUCCESS_ICON: Emoji<'_, '_> = Emoji("✅ ", "");
pub static INFO_ICON: Emoji<'_, '_> = Emoji("ℹ️  ", "");
pub static WARN_ICON: Emoji<'_, '_> = Emoji("⚠️  ", "");
pub static ERROR_ICON: Emoji<'_, '_> = Emoji("❌ ", "");
pub static SCROLL: Emoji<'_, '_> = Emoji("📜 ", "");

pub fn print_success(msg: &str) {
    println!("{} {}", SUCCESS_ICON, style(msg).green());
}

pub fn print_info(msg: &str) {
    println!("{} {}", INFO_ICON, style(msg).blue());
}

pub fn print_warn(msg: &str) {
    println!("{} {}", WARN_ICON, style(msg).yellow());
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", ERROR_ICON, style(msg).red().bold());
}

enum GuideRow {
    Command(String, String),
    Status(String, String),
    Text(String),
    Hint(String, String),
    Blank,
}

/// A titled block of help rows.
pub struct GuideSection {
    title: String,
    rows: Vec<GuideRow>,
}

impl GuideSection {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            rows: Vec::new(),
        }
    }

    pub fn command(mut self, name: &str, description: &str) -> Self {
        self.rows
            .push(GuideRow::Command(name.to_string(), description.to_string()));
        self
    }

    pub fn status(mut self, label: &str, value: &str) -> Self {
        self.rows
            .push(GuideRow::Status(label.to_string(), value.to_string()));
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.rows.push(GuideRow::Text(text.to_string()));
        self
    }

    pub fn hint(mut self, command: &str, note: &str) -> Self {
        self.rows
            .push(GuideRow::Hint(command.to_string(), note.to_string()));
        self
    }

    pub fn blank(mut self) -> Self {
        self.rows.push(GuideRow::Blank);
        self
    }

    pub fn print(&self) {
        println!("\n {}{}", SCROLL, style(&self.title).bold().underlined());
        let width = self
            .rows
            .iter()
            .map(|row| match row {
                GuideRow::Command(name, _) => name.len(),
                _ => 0,
            })
            .max()
            .unwrap_or(0);
        for row in &self.rows {
            match row {
                GuideRow::Command(name, description) => println!(
                    "   {}  {}",
                    style(format!("{:<width$}", name, width = width)).green(),
                    style(description).dim()
                ),
                GuideRow::Status(label, value) => {
                    println!("   {}: {}", style(label).bold().cyan(), value)
                }
                GuideRow::Text(text) => println!("   {}", text),
                GuideRow::Hint(command, note) => {
                    println!("   {} {} {}", style("$").dim(), style(command).yellow(), note)
                }
                GuideRow::Blank => println!(),
            }
        }
    }
}

pub fn print_banner() {
    println!(
        "\n{} {}\n",
        style("clipscript").bold().cyan(),
        style("scripts for your clipboard").dim()
    );
}
