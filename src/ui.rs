use colored::Colorize;
use declarative::Category;

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Print one planned change
pub fn change(category: Category, item: &str) {
    let symbol = match category {
        Category::Add => category.symbol().green(),
        Category::Update => category.symbol().yellow(),
        Category::Remove => category.symbol().red(),
        Category::Track => category.symbol().dimmed(),
    };
    println!("  {} {}", symbol, item);
}

/// Format a change count for summaries
pub fn changes(count: usize) -> String {
    match count {
        1 => "1 change".to_string(),
        n => format!("{n} changes"),
    }
}

/// Print the keel banner
pub fn banner() {
    println!(
        "{}",
        r#"
  ██╗  ██╗███████╗███████╗██╗
  ██║ ██╔╝██╔════╝██╔════╝██║
  █████╔╝ █████╗  █████╗  ██║
  ██╔═██╗ ██╔══╝  ██╔══╝  ██║
  ██║  ██╗███████╗███████╗███████╗
  ╚═╝  ╚═╝╚══════╝╚══════╝╚══════╝
"#
        .cyan()
    );
}

// ============================================================================
// Tests
// ============================================================================
