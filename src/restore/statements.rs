//! Splits a dump script into individually executable statements.

/// Result of splitting a script. `trailing_fragment` holds text after the
/// last terminator, which is never executed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedScript {
    pub statements: Vec<String>,
    pub trailing_fragment: Option<String>,
}

const DEFAULT_DELIMITER: &str = ";";

/// A statement ends on a line whose last non-blank text is the current
/// delimiter (`;` unless changed by a `DELIMITER` directive). Whole-line `--`
/// and `#` comments and plain `/* ... */` blocks are dropped; MySQL
/// conditional comments (`/*!40101 ... */`) are kept as statements.
pub fn split_statements(script: &str) -> ParsedScript {
    let mut parsed = ParsedScript::default();
    let mut delimiter = DEFAULT_DELIMITER.to_string();
    let mut current = String::new();
    let mut in_block_comment = false;

    for raw_line in script.lines() {
        let line = strip_plain_comments(raw_line, &mut in_block_comment, current.is_empty());
        let trimmed = line.trim();

        if trimmed.is_empty() || trimmed.starts_with("--") || trimmed.starts_with('#') {
            continue;
        }

        if current.is_empty() {
            if let Some(new_delimiter) = parse_delimiter_directive(trimmed) {
                delimiter = new_delimiter;
                continue;
            }
        }

        current.push_str(line);
        current.push('\n');

        if trimmed.ends_with(delimiter.as_str()) {
            let statement = current.trim_end();
            let statement = statement[..statement.len() - delimiter.len()].trim();
            if !statement.is_empty() && !is_plain_comment(statement) {
                parsed.statements.push(statement.to_string());
            }
            current.clear();
        }
    }

    let rest = current.trim();
    if !rest.is_empty() {
        parsed.trailing_fragment = Some(rest.to_string());
    }
    parsed
}

/// Removes plain block comments that open a statement, or that close one
/// begun on an earlier line, and returns what is left of `line`. Text after
/// a closing `*/` stays part of the script.
fn strip_plain_comments<'a>(mut line: &'a str, in_block_comment: &mut bool, at_statement_start: bool) -> &'a str {
    loop {
        if *in_block_comment {
            match line.find("*/") {
                Some(end) => {
                    *in_block_comment = false;
                    line = &line[end + 2..];
                }
                None => return "",
            }
        }

        let trimmed = line.trim_start();
        if !at_statement_start || !trimmed.starts_with("/*") || trimmed.starts_with("/*!") {
            return line;
        }
        match trimmed[2..].find("*/") {
            Some(end) => line = &trimmed[end + 4..],
            None => {
                *in_block_comment = true;
                return "";
            }
        }
    }
}

fn parse_delimiter_directive(line: &str) -> Option<String> {
    let (keyword, rest) = line.split_once(char::is_whitespace)?;
    if !keyword.eq_ignore_ascii_case("DELIMITER") {
        return None;
    }
    let delimiter = rest.trim();
    (!delimiter.is_empty()).then(|| delimiter.to_string())
}

fn is_plain_comment(statement: &str) -> bool {
    statement.starts_with("/*") && !statement.starts_with("/*!") && statement.ends_with("*/")
}
