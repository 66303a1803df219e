//! Text diffs for verbose previews

use colored::Colorize;
use std::fs;
use std::path::Path;

/// Changed lines between two texts, prefixed with `-`/`+`
pub fn changed_lines(old: &str, new: &str) -> Vec<(char, String)> {
    similar::TextDiff::from_lines(old, new)
        .iter_all_changes()
        .filter_map(|change| {
            let sign = match change.tag() {
                similar::ChangeTag::Delete => '-',
                similar::ChangeTag::Insert => '+',
                similar::ChangeTag::Equal => return None,
            };
            Some((sign, change.to_string_lossy().trim_end_matches('\n').to_string()))
        })
        .collect()
}

/// Print what overwriting `target` with `source` would change
pub fn show_file_diff(target: &Path, source: &Path) {
    let (Ok(old), Ok(new)) = (fs::read_to_string(target), fs::read_to_string(source)) else {
        println!("    {}", "(binary content differs)".dimmed());
        return;
    };

    let lines = changed_lines(&old, &new);
    if lines.is_empty() {
        println!("    {}", "(files are identical)".dimmed());
        return;
    }
    for (sign, line) in lines {
        let text = format!("{sign} {line}");
        match sign {
            '-' => println!("    {}", text.red()),
            _ => println!("    {}", text.green()),
        }
    }
}
