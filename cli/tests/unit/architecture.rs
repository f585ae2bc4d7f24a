//! Structural tests for architectural boundary enforcement.
//!
//! These tests scan source files to verify that the layer boundaries hold:
//! services never touch infra, output, or the terminal, and only commands
//! write the inventory or talk to the operator.

use std::path::{Path, PathBuf};

/// Collect all `.rs` files under a directory recursively.
fn collect_rs_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                files.extend(collect_rs_files(&path));
            } else if path.extension().and_then(|e| e.to_str()) == Some("rs") {
                files.push(path);
            }
        }
    }
    files
}

fn src(layer: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("src").join(layer)
}

fn relative(file: &Path) -> String {
    file.strip_prefix(env!("CARGO_MANIFEST_DIR"))
        .unwrap_or(file)
        .display()
        .to_string()
}

/// Track brace depth and return whether a line is inside a `#[cfg(test)]` block.
struct CfgTestTracker {
    in_test_block: bool,
    brace_depth: i32,
    test_block_start_depth: i32,
}

impl CfgTestTracker {
    fn new() -> Self {
        Self {
            in_test_block: false,
            brace_depth: 0,
            test_block_start_depth: 0,
        }
    }

    /// Process a line and return `true` if it's inside a `#[cfg(test)]` block.
    fn process_line(&mut self, line: &str) -> bool {
        if line.trim().contains("#[cfg(test)]") {
            self.in_test_block = true;
            self.test_block_start_depth = self.brace_depth;
        }
        for ch in line.chars() {
            match ch {
                '{' => self.brace_depth += 1,
                '}' => {
                    self.brace_depth -= 1;
                    if self.in_test_block && self.brace_depth <= self.test_block_start_depth {
                        self.in_test_block = false;
                        return true;
                    }
                }
                _ => {}
            }
        }
        self.in_test_block
    }
}

/// Production lines of every file under `dir`, as `(file, lineno, line)`.
/// Comments and `#[cfg(test)]` blocks are skipped.
fn production_lines(dir: &Path) -> Vec<(String, usize, String)> {
    let mut out = Vec::new();
    for file in collect_rs_files(dir) {
        let Ok(content) = std::fs::read_to_string(&file) else {
            continue;
        };
        let rel = relative(&file);
        let mut tracker = CfgTestTracker::new();
        for (i, line) in content.lines().enumerate() {
            let in_test = tracker.process_line(line);
            let trimmed = line.trim();
            if in_test || trimmed.starts_with("//") || trimmed.starts_with('*') {
                continue;
            }
            out.push((rel.clone(), i + 1, line.to_string()));
        }
    }
    out
}

fn violations(dir: &Path, forbidden: &[&str]) -> Vec<String> {
    production_lines(dir)
        .into_iter()
        .filter(|(_, _, line)| forbidden.iter().any(|f| line.contains(f)))
        .map(|(rel, n, line)| format!("{rel}:{n}: {}", line.trim()))
        .collect()
}

// ── Rendering ─────────────────────────────────────────────────────────────────

#[test]
fn no_inline_json_branching_in_commands() {
    let mut found = violations(&src("commands"), &["json: bool"]);
    found.extend(
        production_lines(&src("commands"))
            .into_iter()
            .filter(|(_, _, l)| {
                let t = l.trim();
                t.starts_with("if json") || t.starts_with("if !json")
            })
            .map(|(rel, n, l)| format!("{rel}:{n}: {}", l.trim())),
    );
    assert!(
        found.is_empty(),
        "Found inline JSON branching in commands/ — use app.renderer() instead:\n{}",
        found.join("\n")
    );
}

#[test]
fn commands_print_only_through_output() {
    let found = violations(&src("commands"), &["println!", "eprintln!", "print!("]);
    assert!(
        found.is_empty(),
        "commands/ must print through app.output or app.renderer():\n{}",
        found.join("\n")
    );
}

#[test]
fn infra_has_no_print_macros_outside_tests() {
    let found = violations(&src("infra"), &["println!", "eprintln!"]);
    assert!(
        found.is_empty(),
        "infra/ must not use println!/eprintln! outside #[cfg(test)]:\n{}",
        found.join("\n")
    );
}

// ── Layering ──────────────────────────────────────────────────────────────────

#[test]
fn infra_has_no_imports_from_commands_or_output() {
    let found = violations(&src("infra"), &["crate::commands", "crate::output"]);
    assert!(
        found.is_empty(),
        "infra/ must not import from commands/ or output/:\n{}",
        found.join("\n")
    );
}

#[test]
fn application_has_no_infra_output_or_command_imports() {
    let found = violations(
        &src("application"),
        &["crate::infra", "crate::output", "crate::commands", "crate::app::"],
    );
    assert!(
        found.is_empty(),
        "application/ must depend only on domain/ and its own ports:\n{}",
        found.join("\n")
    );
}

#[test]
fn domain_depends_on_nothing_above_it() {
    let found = violations(
        &src("domain"),
        &["crate::application", "crate::infra", "crate::output", "crate::commands"],
    );
    assert!(found.is_empty(), "domain/ must stay pure:\n{}", found.join("\n"));
}

// ── Operator interaction ──────────────────────────────────────────────────────

#[test]
fn prompts_live_only_in_commands() {
    let mut found = Vec::new();
    for layer in ["application", "domain", "infra", "output"] {
        found.extend(violations(&src(layer), &["dialoguer", "stdin()"]));
    }
    assert!(
        found.is_empty(),
        "only commands/ may prompt the operator:\n{}",
        found.join("\n")
    );
}

#[test]
fn services_never_write_the_inventory() {
    let found = violations(&src("application/services"), &["InventoryStore", ".save("]);
    assert!(
        found.is_empty(),
        "services propose status changes; commands persist them:\n{}",
        found.join("\n")
    );
}

#[test]
fn secrets_are_exposed_only_where_they_are_consumed() {
    let allowed = ["src/domain/credential.rs", "src/infra/keys.rs"];
    let found: Vec<String> = production_lines(&src(""))
        .into_iter()
        .filter(|(rel, _, line)| {
            line.contains("expose_secret") && !allowed.iter().any(|a| rel.ends_with(a))
        })
        .map(|(rel, n, line)| format!("{rel}:{n}: {}", line.trim()))
        .collect();
    assert!(
        found.is_empty(),
        "expose_secret() outside the credential and key store modules:\n{}",
        found.join("\n")
    );
}
