//! Path patcher: point the binding's build script at the native install tree.
//!
//! Rules are literal substitutions applied in order. Each rule only sees text
//! that no earlier rule has written, so a replacement path is never rewritten
//! again by a later pattern. A rule matching fewer times than it requires
//! aborts the whole patch and leaves the script untouched.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use mclenv_core::config::{PatchRuleSpec, PatchSection};
use mclenv_core::error::{BootstrapError, BootstrapResult};
use mclenv_core::info_log;
use mclenv_core::model::BuildOutputLayout;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchRule {
    pub label: String,
    pub pattern: String,
    pub replacement: String,
    pub min_matches: usize,
}

impl PatchRule {
    /// Fill `{include}`, `{lib}` and `{prefix}` from the install layout.
    pub fn render(spec: &PatchRuleSpec, layout: &BuildOutputLayout) -> Self {
        let replacement = spec
            .replacement
            .replace("{include}", &script_path(&layout.include_dir))
            .replace("{lib}", &script_path(&layout.lib_dir))
            .replace("{prefix}", &script_path(&layout.root));
        Self {
            label: spec.label.clone(),
            pattern: spec.pattern.clone(),
            replacement,
            min_matches: spec.min_matches,
        }
    }
}

/// Paths go into Python string literals; forward slashes work everywhere.
fn script_path(p: &Path) -> String {
    let s = p.to_string_lossy().to_string();
    if cfg!(windows) {
        s.replace('\\', "/")
    } else {
        s
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchReport {
    pub script: PathBuf,
    /// Matches replaced per rule, in rule order.
    pub replaced: Vec<(String, usize)>,
    pub imports_added: Vec<String>,
}

impl PatchReport {
    pub fn total_replaced(&self) -> usize {
        self.replaced.iter().map(|(_, n)| n).sum()
    }
}

#[derive(Debug, Clone)]
pub struct PathPatcher {
    rules: Vec<PatchRule>,
    imports: Vec<String>,
}

impl PathPatcher {
    pub fn new(rules: Vec<PatchRule>, imports: Vec<String>) -> BootstrapResult<Self> {
        check_rules(&rules)?;
        Ok(Self { rules, imports })
    }

    pub fn from_section(section: &PatchSection, layout: &BuildOutputLayout) -> BootstrapResult<Self> {
        let rules = section
            .rules
            .iter()
            .map(|r| PatchRule::render(r, layout))
            .collect();
        Self::new(rules, section.imports.clone())
    }

    pub fn rules(&self) -> &[PatchRule] {
        &self.rules
    }

    /// Patch `script` in place. The file is replaced atomically and only once
    /// every rule has matched.
    pub fn apply(&self, script: &Path) -> BootstrapResult<PatchReport> {
        let io_err = |source| BootstrapError::PatchIo {
            script: script.to_path_buf(),
            source,
        };
        let original = fs::read_to_string(script).map_err(io_err)?;
        let (patched, report) = self.apply_to_text(&original, script)?;
        if patched != original {
            write_atomic(script, &patched).map_err(io_err)?;
        }
        info_log!(
            "patched {} ({} path(s) rewritten)",
            script.display(),
            report.total_replaced()
        );
        Ok(report)
    }

    pub fn apply_to_text(&self, text: &str, script: &Path) -> BootstrapResult<(String, PatchReport)> {
        let mut spans = vec![Span::Original(text.to_string())];
        let mut replaced = Vec::with_capacity(self.rules.len());
        for rule in &self.rules {
            let found: usize = spans.iter().map(|span| span.count(&rule.pattern)).sum();
            if found < rule.min_matches {
                return Err(BootstrapError::PatchNotApplied {
                    label: rule.label.clone(),
                    pattern: rule.pattern.clone(),
                    script: script.to_path_buf(),
                    found,
                    required: rule.min_matches,
                });
            }
            spans = spans.into_iter().flat_map(|span| span.rewrite(rule)).collect();
            tracing::debug!(rule = %rule.label, found, "rule applied");
            replaced.push((rule.label.clone(), found));
        }
        let mut current: String = spans.iter().map(Span::as_str).collect();

        let mut imports_added = Vec::new();
        for line in &self.imports {
            if !has_line(&current, line) {
                current = insert_import(&current, line);
                imports_added.push(line.clone());
            }
        }

        Ok((
            current,
            PatchReport {
                script: script.to_path_buf(),
                replaced,
                imports_added,
            },
        ))
    }
}

/// Script text, split into what was read from disk and what a rule wrote.
enum Span {
    Original(String),
    Rewritten(String),
}

impl Span {
    fn as_str(&self) -> &str {
        match self {
            Span::Original(s) | Span::Rewritten(s) => s,
        }
    }

    fn count(&self, pattern: &str) -> usize {
        match self {
            Span::Original(s) => s.matches(pattern).count(),
            Span::Rewritten(_) => 0,
        }
    }

    fn rewrite(self, rule: &PatchRule) -> Vec<Span> {
        let text = match self {
            Span::Original(text) => text,
            rewritten => return vec![rewritten],
        };
        let mut out = Vec::new();
        for (i, piece) in text.split(rule.pattern.as_str()).enumerate() {
            if i > 0 {
                out.push(Span::Rewritten(rule.replacement.clone()));
            }
            if !piece.is_empty() {
                out.push(Span::Original(piece.to_string()));
            }
        }
        out
    }
}

/// An empty pattern would match between every character.
fn check_rules(rules: &[PatchRule]) -> BootstrapResult<()> {
    if let Some(rule) = rules.iter().find(|r| r.pattern.is_empty()) {
        return Err(BootstrapError::PatchRules(format!(
            "rule '{}' has an empty pattern",
            rule.label
        )));
    }
    Ok(())
}

fn has_line(text: &str, wanted: &str) -> bool {
    let wanted = wanted.trim();
    text.lines().any(|l| l.trim() == wanted)
}

/// Insert `line` after any shebang / encoding header and after
/// `from __future__` imports, which Python requires to come first.
fn insert_import(text: &str, line: &str) -> String {
    let newline = if text.contains("\r\n") { "\r\n" } else { "\n" };
    let lines: Vec<&str> = text.split_inclusive('\n').collect();

    let mut at = 0;
    for (i, l) in lines.iter().enumerate().take(2) {
        let t = l.trim_end();
        if (i == 0 && t.starts_with("#!")) || (t.starts_with('#') && t.contains("coding")) {
            at = i + 1;
        } else {
            break;
        }
    }
    if let Some(last_future) = lines
        .iter()
        .rposition(|l| l.starts_with("from __future__ import"))
    {
        at = at.max(last_future + 1);
    }

    let mut out = String::with_capacity(text.len() + line.len() + 2);
    for l in &lines[..at] {
        out.push_str(l);
    }
    if at > 0 && !out.ends_with('\n') {
        out.push_str(newline);
    }
    out.push_str(line);
    out.push_str(newline);
    for l in &lines[at..] {
        out.push_str(l);
    }
    out
}

fn write_atomic(path: &Path, content: &str) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let perms = fs::metadata(path)?.permissions();
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(content.as_bytes())?;
    tmp.as_file().sync_all()?;
    fs::set_permissions(tmp.path(), perms)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SETUP_PY: &str = r#"from setuptools import setup, Extension

ext = Extension(
    "pymcl",
    sources=["src/pymcl.cpp"],
    include_dirs=["mcl/include"],
    library_dirs=["mcl/lib"],
    libraries=["mcl"],
)
setup(name="pymcl", ext_modules=[ext])
"#;

    fn layout() -> BuildOutputLayout {
        BuildOutputLayout::under(Path::new("/work/proj/.mclenv/mcl"))
    }

    fn default_patcher() -> PathPatcher {
        PathPatcher::from_section(&PatchSection::default(), &layout()).unwrap()
    }

    #[cfg(unix)]
    #[test]
    fn test_default_rules_rewrite_paths() {
        let (out, report) = default_patcher()
            .apply_to_text(SETUP_PY, Path::new("setup.py"))
            .unwrap();
        assert!(out.contains(r#"include_dirs=["/work/proj/.mclenv/mcl/include"]"#));
        assert!(out.contains(r#"library_dirs=["/work/proj/.mclenv/mcl/lib"]"#));
        assert!(out.starts_with("import os\nfrom setuptools"));
        assert_eq!(
            report.replaced,
            vec![("headers".to_string(), 1), ("libraries".to_string(), 1)]
        );
        assert_eq!(report.imports_added, vec!["import os"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_everything_else_unchanged() {
        let (out, _) = default_patcher()
            .apply_to_text(SETUP_PY, Path::new("setup.py"))
            .unwrap();
        let expected = format!(
            "import os\n{}",
            SETUP_PY
                .replace("mcl/include", "/work/proj/.mclenv/mcl/include")
                .replace("\"mcl/lib\"", "\"/work/proj/.mclenv/mcl/lib\"")
        );
        assert_eq!(out, expected);
    }

    #[test]
    fn test_zero_matches_fails_and_names_rule() {
        let tmp = tempfile::tempdir().unwrap();
        let script = tmp.path().join("setup.py");
        let text = "setup(include_dirs=['vendor/include'], library_dirs=['mcl/lib'])\n";
        fs::write(&script, text).unwrap();

        let err = default_patcher().apply(&script).unwrap_err();
        match &err {
            BootstrapError::PatchNotApplied {
                label,
                pattern,
                found,
                ..
            } => {
                assert_eq!(label, "headers");
                assert_eq!(pattern, "mcl/include");
                assert_eq!(*found, 0);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains("setup.py"));
        // Nothing written on failure.
        assert_eq!(fs::read_to_string(&script).unwrap(), text);
    }

    #[test]
    fn test_min_matches_enforced() {
        let spec = PatchRuleSpec {
            label: "headers".into(),
            pattern: "mcl/include".into(),
            replacement: "{include}".into(),
            min_matches: 2,
        };
        let patcher = PathPatcher::new(vec![PatchRule::render(&spec, &layout())], vec![]).unwrap();
        let err = patcher
            .apply_to_text("x = 'mcl/include'\n", Path::new("setup.py"))
            .unwrap_err();
        assert!(matches!(
            err,
            BootstrapError::PatchNotApplied {
                found: 1,
                required: 2,
                ..
            }
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_project_path_containing_later_pattern() {
        let layout = BuildOutputLayout::under(Path::new("/home/u/mcl/lib-work/.mclenv/mcl"));
        let patcher = PathPatcher::from_section(&PatchSection::default(), &layout).unwrap();
        let (out, report) = patcher.apply_to_text(SETUP_PY, Path::new("setup.py")).unwrap();
        assert!(out.contains(r#"include_dirs=["/home/u/mcl/lib-work/.mclenv/mcl/include"]"#), "{}", out);
        assert!(out.contains(r#"library_dirs=["/home/u/mcl/lib-work/.mclenv/mcl/lib"]"#), "{}", out);
        assert_eq!(
            report.replaced,
            vec![("headers".to_string(), 1), ("libraries".to_string(), 1)]
        );
    }

    #[test]
    fn test_empty_pattern_rejected() {
        let rules = vec![PatchRule {
            label: "nothing".into(),
            pattern: String::new(),
            replacement: "/opt".into(),
            min_matches: 1,
        }];
        let err = PathPatcher::new(rules, vec![]).unwrap_err();
        assert!(matches!(err, BootstrapError::PatchRules(_)));
        assert!(err.to_string().contains("'nothing'"));
    }

    #[test]
    fn test_existing_import_not_duplicated() {
        let text = "import os\nimport sys\ninclude_dirs=['mcl/include']\nlib=['mcl/lib']\n";
        let (out, report) = default_patcher()
            .apply_to_text(text, Path::new("setup.py"))
            .unwrap();
        assert_eq!(out.matches("import os").count(), 1);
        assert!(report.imports_added.is_empty());
    }

    #[test]
    fn test_import_after_shebang_and_future() {
        let text = "#!/usr/bin/env python\n# -*- coding: utf-8 -*-\nfrom __future__ import annotations\nx = 1\n";
        let out = insert_import(text, "import os");
        assert_eq!(
            out,
            "#!/usr/bin/env python\n# -*- coding: utf-8 -*-\nfrom __future__ import annotations\nimport os\nx = 1\n"
        );
    }

    #[test]
    fn test_import_keeps_crlf() {
        let out = insert_import("x = 1\r\n", "import os");
        assert_eq!(out, "import os\r\nx = 1\r\n");
    }

    #[test]
    fn test_apply_writes_file_in_place() {
        let tmp = tempfile::tempdir().unwrap();
        let script = tmp.path().join("setup.py");
        fs::write(&script, SETUP_PY).unwrap();
        let report = default_patcher().apply(&script).unwrap();
        assert_eq!(report.total_replaced(), 2);
        let content = fs::read_to_string(&script).unwrap();
        assert!(!content.contains("\"mcl/include\""));
        // Only the script itself in the directory: no stray temp files.
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 1);
    }
}
