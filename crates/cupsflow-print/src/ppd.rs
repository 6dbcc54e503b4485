// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PostScript Printer Description (PPD) parsing.
//
// Covers the subset a print dialog needs: option groups, UI options with
// their choices and defaults, constraints between choices, paper sizes with
// imageable areas, and hardware margins.  Every statement has the shape
//
//   *MainKeyword OptionKeyword/Translation: Value
//
// where the option part is optional and a quoted value may span lines.

use std::collections::{BTreeMap, HashMap};
use std::io::Read;

use tracing::{debug, warn};

use cupsflow_core::error::{CupsflowError, Result};

/// How a UI option is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiKind {
    PickOne,
    PickMany,
    Boolean,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PpdChoice {
    pub choice: String,
    /// Human-readable text (falls back to the choice keyword).
    pub text: String,
    /// PostScript or JCL code emitted for this choice.
    pub code: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PpdOption {
    pub keyword: String,
    pub text: String,
    pub ui: UiKind,
    pub default_choice: Option<String>,
    pub choices: Vec<PpdChoice>,
}

impl PpdOption {
    pub fn find_choice(&self, choice: &str) -> Option<&PpdChoice> {
        self.choices.iter().find(|c| c.choice == choice)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PpdGroup {
    pub name: String,
    pub text: String,
    pub options: Vec<PpdOption>,
}

/// `*UIConstraints`: marking `choice1` of `option1` together with `choice2`
/// of `option2` is invalid.  A missing choice means any choice except
/// `None`, `False`, or `Off`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PpdConstraint {
    pub option1: String,
    pub choice1: Option<String>,
    pub option2: String,
    pub choice2: Option<String>,
}

/// Margins in points.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Margins {
    pub left: f64,
    pub bottom: f64,
    pub right: f64,
    pub top: f64,
}

/// A media size in points, with the margins of its imageable area.
#[derive(Debug, Clone, PartialEq)]
pub struct PaperSize {
    pub name: String,
    pub text: String,
    pub width: f64,
    pub length: f64,
    pub margins: Margins,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct SizeEntry {
    text: String,
    dimension: Option<(f64, f64)>,
    /// Lower-left x/y, upper-right x/y.
    imageable: Option<[f64; 4]>,
}

/// A parsed PPD file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PpdFile {
    pub model_name: Option<String>,
    pub nick_name: Option<String>,
    pub color_device: bool,
    pub language_encoding: Option<String>,
    pub groups: Vec<PpdGroup>,
    pub constraints: Vec<PpdConstraint>,
    hw_margins: Option<Margins>,
    sizes: Vec<(String, SizeEntry)>,
}

/// Choices that never take part in an unqualified constraint.
const OFF_CHOICES: &[&str] = &["None", "False", "Off"];

const GENERAL_GROUP: &str = "General";

impl PpdFile {
    /// Parse from a reader.  The text is decoded as Latin-1 when the file
    /// declares `*LanguageEncoding: ISOLatin1` or is not valid UTF-8.
    pub fn parse(mut reader: impl Read) -> Result<Self> {
        let mut raw = Vec::new();
        reader.read_to_end(&mut raw)?;
        Self::parse_str(&decode_text(&raw))
    }

    pub fn parse_str(text: &str) -> Result<Self> {
        Parser::default().run(text)
    }

    /// Look up a UI option by keyword.
    pub fn find_option(&self, keyword: &str) -> Option<&PpdOption> {
        self.options().find(|o| o.keyword == keyword)
    }

    pub fn options(&self) -> impl Iterator<Item = &PpdOption> {
        self.groups.iter().flat_map(|g| g.options.iter())
    }

    /// Keywords of options involved in a violated constraint, given the
    /// choices in `marked` layered over the defaults.
    pub fn conflicts(&self, marked: &HashMap<String, String>) -> Vec<String> {
        let choice_of = |option: &str| -> Option<String> {
            marked.get(option).cloned().or_else(|| {
                self.find_option(option)
                    .and_then(|o| o.default_choice.clone())
            })
        };
        let matches = |option: &str, wanted: &Option<String>| -> bool {
            match (choice_of(option), wanted) {
                (Some(current), Some(wanted)) => current == *wanted,
                (Some(current), None) => !OFF_CHOICES.contains(&current.as_str()),
                (None, _) => false,
            }
        };

        let mut conflicting: Vec<String> = Vec::new();
        for c in &self.constraints {
            if matches(&c.option1, &c.choice1) && matches(&c.option2, &c.choice2) {
                for option in [&c.option1, &c.option2] {
                    if !conflicting.contains(option) {
                        conflicting.push(option.clone());
                    }
                }
            }
        }
        conflicting
    }

    /// Every size that has a `*PaperDimension`, in file order.
    pub fn papers(&self) -> Vec<PaperSize> {
        self.sizes
            .iter()
            .filter_map(|(name, entry)| {
                let (width, length) = entry.dimension?;
                let margins = match entry.imageable {
                    Some([llx, lly, urx, ury]) => Margins {
                        left: llx,
                        bottom: lly,
                        right: width - urx,
                        top: length - ury,
                    },
                    None => self.hw_margins.unwrap_or_default(),
                };
                Some(PaperSize {
                    name: name.clone(),
                    text: entry.text.clone(),
                    width,
                    length,
                    margins,
                })
            })
            .collect()
    }

    /// `*HWMargins`, if the file declares them.
    pub fn hard_margins(&self) -> Option<Margins> {
        self.hw_margins
    }

    fn size_entry(&mut self, name: &str) -> &mut SizeEntry {
        let index = match self.sizes.iter().position(|(n, _)| n == name) {
            Some(index) => index,
            None => {
                self.sizes.push((name.to_string(), SizeEntry::default()));
                self.sizes.len() - 1
            }
        };
        &mut self.sizes[index].1
    }
}

fn decode_text(raw: &[u8]) -> String {
    let declares_latin1 = raw
        .split(|&b| b == b'\n')
        .take(200)
        .any(|line| line.starts_with(b"*LanguageEncoding:") && line.windows(9).any(|w| w == b"ISOLatin1"));
    match std::str::from_utf8(raw) {
        Ok(text) if !declares_latin1 => text.to_string(),
        _ => raw.iter().map(|&b| char::from(b)).collect(),
    }
}

/// One `*Keyword Option/Text: Value` statement.
#[derive(Debug, Default, PartialEq)]
struct Statement {
    keyword: String,
    option: Option<String>,
    text: Option<String>,
    value: String,
}

#[derive(Default)]
struct Parser {
    ppd: PpdFile,
    group: Option<PpdGroup>,
    option: Option<PpdOption>,
    defaults: BTreeMap<String, String>,
}

impl Parser {
    fn run(mut self, text: &str) -> Result<PpdFile> {
        let mut lines = text.lines().enumerate().peekable();

        match lines.peek() {
            Some((_, first)) if first.starts_with("*PPD-Adobe:") => {}
            _ => {
                return Err(CupsflowError::Ppd {
                    line: 1,
                    detail: "missing *PPD-Adobe header".into(),
                });
            }
        }

        while let Some((index, line)) = lines.next() {
            let line_no = index + 1;
            if !line.starts_with('*') || line.starts_with("*%") || line == "*End" {
                continue;
            }

            let mut full = line.to_string();
            // A quoted value continues until its closing quote.
            if quote_open(&full) {
                loop {
                    let Some((_, next)) = lines.next() else {
                        return Err(CupsflowError::Ppd {
                            line: line_no,
                            detail: "unterminated quoted value".into(),
                        });
                    };
                    full.push('\n');
                    full.push_str(next);
                    if !quote_open(&full) {
                        break;
                    }
                }
            }

            let Some(statement) = parse_statement(&full) else {
                debug!(line = line_no, "skipping malformed PPD line");
                continue;
            };
            self.apply(statement, line_no)?;
        }

        self.close_option();
        self.close_group();

        for (keyword, choice) in self.defaults {
            let option = self
                .ppd
                .groups
                .iter_mut()
                .flat_map(|g| g.options.iter_mut())
                .find(|o| o.keyword == keyword);
            if let Some(option) = option {
                option.default_choice = Some(choice);
            }
        }
        Ok(self.ppd)
    }

    fn apply(&mut self, st: Statement, line: usize) -> Result<()> {
        match st.keyword.as_str() {
            "OpenGroup" => {
                self.close_option();
                self.close_group();
                let (name, text) = split_translation(&st.value);
                self.group = Some(PpdGroup {
                    text: text.unwrap_or_else(|| name.clone()),
                    name,
                    options: Vec::new(),
                });
            }
            "CloseGroup" => {
                self.close_option();
                self.close_group();
            }
            "OpenUI" | "JCLOpenUI" => {
                self.close_option();
                let Some(option) = st.option else {
                    return Err(CupsflowError::Ppd {
                        line,
                        detail: "OpenUI without an option keyword".into(),
                    });
                };
                let keyword = option.trim_start_matches('*').to_string();
                let ui = match st.value.trim() {
                    "PickOne" => UiKind::PickOne,
                    "PickMany" => UiKind::PickMany,
                    "Boolean" => UiKind::Boolean,
                    other => {
                        warn!(line, ui = other, "unknown UI type, assuming PickOne");
                        UiKind::PickOne
                    }
                };
                self.option = Some(PpdOption {
                    text: st.text.unwrap_or_else(|| keyword.clone()),
                    keyword,
                    ui,
                    default_choice: None,
                    choices: Vec::new(),
                });
            }
            "CloseUI" | "JCLCloseUI" => self.close_option(),
            "UIConstraints" => {
                if let Some(constraint) = parse_constraint(&st.value) {
                    self.ppd.constraints.push(constraint);
                }
            }
            "PaperDimension" => {
                if let (Some(name), [w, l]) = (&st.option, numbers(&st.value).as_slice()) {
                    let entry = self.ppd.size_entry(name);
                    entry.dimension = Some((*w, *l));
                    if let Some(text) = &st.text {
                        entry.text = text.clone();
                    }
                }
            }
            "ImageableArea" => {
                if let (Some(name), [a, b, c, d]) = (&st.option, numbers(&st.value).as_slice()) {
                    let entry = self.ppd.size_entry(name);
                    entry.imageable = Some([*a, *b, *c, *d]);
                    if let Some(text) = &st.text {
                        entry.text = text.clone();
                    }
                }
            }
            "HWMargins" => {
                if let [left, bottom, right, top] = numbers(&st.value).as_slice() {
                    self.ppd.hw_margins = Some(Margins {
                        left: *left,
                        bottom: *bottom,
                        right: *right,
                        top: *top,
                    });
                }
            }
            "ModelName" => self.ppd.model_name = Some(st.value),
            "NickName" => self.ppd.nick_name = Some(st.value),
            "ColorDevice" => self.ppd.color_device = st.value.eq_ignore_ascii_case("true"),
            "LanguageEncoding" => self.ppd.language_encoding = Some(st.value),
            keyword => {
                if let Some(default_for) = keyword.strip_prefix("Default") {
                    if !default_for.is_empty() && st.option.is_none() {
                        self.defaults.insert(default_for.to_string(), st.value);
                    }
                    return Ok(());
                }
                if let Some(option) = self.option.as_mut() {
                    if option.keyword == keyword {
                        if let Some(choice) = st.option {
                            option.choices.push(PpdChoice {
                                text: st.text.unwrap_or_else(|| choice.clone()),
                                choice,
                                code: st.value,
                            });
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn close_option(&mut self) {
        let Some(option) = self.option.take() else {
            return;
        };
        let group = self.group.get_or_insert_with(|| PpdGroup {
            name: GENERAL_GROUP.into(),
            text: GENERAL_GROUP.into(),
            options: Vec::new(),
        });
        group.options.push(option);
    }

    fn close_group(&mut self) {
        let Some(group) = self.group.take() else {
            return;
        };
        // Options outside any group share one implicit group.
        match self.ppd.groups.iter_mut().find(|g| g.name == group.name) {
            Some(existing) => existing.options.extend(group.options),
            None => self.ppd.groups.push(group),
        }
    }
}

fn quote_open(text: &str) -> bool {
    let value = match text.split_once(':') {
        Some((_, value)) => value,
        None => return false,
    };
    value.chars().filter(|&c| c == '"').count() % 2 == 1
}

fn parse_statement(line: &str) -> Option<Statement> {
    let body = line.strip_prefix('*')?;
    let key_end = body
        .find(|c: char| c.is_ascii_whitespace() || c == ':')
        .unwrap_or(body.len());
    let keyword = body[..key_end].to_string();
    let rest = &body[key_end..];

    let (selector, value) = match rest.strip_prefix(':') {
        Some(value) => ("", value),
        None => rest.split_once(':')?,
    };
    let selector = selector.trim();
    let (option, text) = if selector.is_empty() {
        (None, None)
    } else {
        let (option, text) = split_translation(selector);
        (Some(option), text)
    };

    let value = value.trim();
    let value = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
        .to_string();

    Some(Statement {
        keyword,
        option,
        text,
        value,
    })
}

/// Split `name/Translation` into its parts.
fn split_translation(s: &str) -> (String, Option<String>) {
    match s.split_once('/') {
        Some((name, text)) => (name.trim().to_string(), Some(text.trim().to_string())),
        None => (s.trim().to_string(), None),
    }
}

fn parse_constraint(value: &str) -> Option<PpdConstraint> {
    let mut tokens = value.split_whitespace().peekable();
    let mut next_pair = || -> Option<(String, Option<String>)> {
        let option = tokens.next()?.strip_prefix('*')?.to_string();
        let choice = match tokens.peek() {
            Some(t) if !t.starts_with('*') => tokens.next().map(str::to_string),
            _ => None,
        };
        Some((option, choice))
    };
    let (option1, choice1) = next_pair()?;
    let (option2, choice2) = next_pair()?;
    Some(PpdConstraint {
        option1,
        choice1,
        option2,
        choice2,
    })
}

fn numbers(value: &str) -> Vec<f64> {
    value
        .split_whitespace()
        .filter_map(|n| n.parse().ok())
        .collect()
}
