//! Helpers used by the plot-generation workflow: prompt templates and
//! run-id extraction from agent output.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde_json::Value;

/// Substitute `$1`..`$9` with positional arguments and `$ARGUMENTS` with all
/// of them joined by a single space. A positional token with no matching
/// argument, and any other `$` sequence, is left as written.
pub fn render_template(text: &str, args: &[String]) -> String {
  let mut out = String::with_capacity(text.len());
  let mut rest = text;

  while let Some(pos) = rest.find('$') {
    out.push_str(&rest[..pos]);
    let after = &rest[pos + 1..];

    if let Some(tail) = after.strip_prefix("ARGUMENTS") {
      out.push_str(&args.join(" "));
      rest = tail;
      continue;
    }

    let positional = after
      .chars()
      .next()
      .and_then(|c| c.to_digit(10))
      .filter(|&d| d >= 1);
    match positional.and_then(|d| args.get(d as usize - 1)) {
      Some(arg) => {
        out.push_str(arg);
        // Digits are one byte.
        rest = &after[1..];
      }
      None => {
        out.push('$');
        rest = after;
      }
    }
  }

  out.push_str(rest);
  out
}

/// Resolve a template name inside `dir`. Names without an extension get
/// `.md` appended.
pub fn template_path(dir: &Path, name: &str) -> PathBuf {
  if Path::new(name).extension().is_some() {
    dir.join(name)
  } else {
    dir.join(format!("{name}.md"))
  }
}

pub fn load_template(dir: &Path, name: &str) -> anyhow::Result<String> {
  let path = template_path(dir, name);
  std::fs::read_to_string(&path)
    .with_context(|| format!("failed to read template {}", path.display()))
}

/// Pull `run_id` out of a JSON object printed by a workflow step.
///
/// The whole output is tried first; failing that, the last line that parses
/// as an object is used. String and numeric ids are accepted, numbers are
/// returned in their decimal form.
pub fn parse_run_id(stdout: &str) -> Option<String> {
  let trimmed = stdout.trim();
  let object = as_object(trimmed)
    .or_else(|| trimmed.lines().rev().find_map(|line| as_object(line.trim())))?;

  match object.get("run_id")? {
    Value::String(s) => Some(s.clone()),
    Value::Number(n) => Some(n.to_string()),
    _ => None,
  }
}

fn as_object(text: &str) -> Option<Value> {
  match serde_json::from_str::<Value>(text) {
    Ok(value @ Value::Object(_)) => Some(value),
    _ => None,
  }
}
