/// Splits a line-oriented name list into its non-empty lines.
///
/// Both `\n` and `\r\n` end a line. Blank lines are dropped, which also makes a
/// trailing newline irrelevant. Nothing else is trimmed: leading or trailing
/// spaces are part of the name.
pub fn parse_names(text: &str) -> Vec<String> {
    text.lines()
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Renders names back into the list format read by [`parse_names`].
pub fn render_names<S: AsRef<str>>(names: &[S]) -> String {
    let mut out = String::new();
    for name in names {
        out.push_str(name.as_ref());
        out.push('\n');
    }
    out
}
