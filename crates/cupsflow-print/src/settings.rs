// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Printer options and job settings.
//
// A print dialog shows an `OptionSet` per printer: the job options every
// CUPS queue understands plus the UI options of the printer's PPD, sorted
// onto dialog pages.  Job settings carry generic names and values
// (`duplex` = `horizontal`); the server-bound form of a setting lives under
// a `cups-` key and wins when both are present.

use std::collections::HashMap;

use tracing::debug;

use cupsflow_core::types::JobSettings;

use crate::ppd::{PpdChoice, PpdFile, PpdGroup, PpdOption, UiKind};

/// Generic setting keys understood by [`printer_options`],
/// [`settings_from_options`] and [`prepare_for_print`].
pub mod keys {
    pub const DEFAULT_SOURCE: &str = "default-source";
    pub const OUTPUT_BIN: &str = "output-bin";
    pub const DUPLEX: &str = "duplex";
    pub const QUALITY: &str = "quality";
    pub const RESOLUTION: &str = "resolution";
    pub const MEDIA_TYPE: &str = "media-type";
    pub const NUMBER_UP: &str = "number-up";
    pub const N_COPIES: &str = "n-copies";
    pub const COLLATE: &str = "collate";
    pub const REVERSE: &str = "reverse";
    pub const SCALE: &str = "scale";
    pub const PAGE_SET: &str = "page-set";
    pub const PRINT_PAGES: &str = "print-pages";
    pub const PAGE_RANGES: &str = "page-ranges";
    pub const PRINT_AT: &str = "print-at";
    pub const PRINT_AT_TIME: &str = "print-at-time";
    pub const COVER_BEFORE: &str = "cover-before";
    pub const COVER_AFTER: &str = "cover-after";
}

/// Work the server does so the client renderer does not have to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub copies: bool,
    pub collate: bool,
    pub reverse: bool,
}

impl Capabilities {
    pub const CUPS: Self = Self {
        copies: true,
        collate: true,
        reverse: true,
    };
}

// -- dialog tables ----------------------------------------------------------
//
// Searched with `binary_search`; keep every table sorted.

const COLOR_OPTIONS: &[&str] = &[
    "BRColorEnhancement",
    "BRColorMatching",
    "BRColorMode",
    "BRGammaValue",
    "BRImprovedGray",
    "BlackSubstitution",
    "ColorModel",
    "HPCMYKInks",
    "HPCSGraphics",
    "HPCSImages",
    "HPCSText",
    "HPColorSmart",
    "RPSBlackMode",
    "RPSBlackOverPrint",
    "Rcmyksimulation",
];

const COLOR_GROUPS: &[&str] = &[
    "ColorPage",
    "FPColorWise1",
    "FPColorWise2",
    "FPColorWise3",
    "FPColorWise4",
    "FPColorWise5",
    "HPColorOptionsPanel",
];

const IMAGE_QUALITY_OPTIONS: &[&str] = &[
    "BRDocument",
    "BRHalfTonePattern",
    "BRNormalPrt",
    "BRPrintQuality",
    "BitsPerPixel",
    "Darkness",
    "Dithering",
    "EconoMode",
    "Economode",
    "HPEconoMode",
    "HPEdgeControl",
    "HPGraphicsHalftone",
    "HPHalftone",
    "HPLJDensity",
    "HPPhotoHalftone",
    "OutputMode",
    "REt",
    "RPSBitsPerPixel",
    "RPSDitherType",
    "Resolution",
    "ScreenLock",
    "Smoothing",
    "TonerSaveMode",
    "UCRGCRForImage",
];

const IMAGE_QUALITY_GROUPS: &[&str] = &[
    "FPImageQuality1",
    "FPImageQuality2",
    "FPImageQuality3",
    "ImageQualityPage",
];

const FINISHING_OPTIONS: &[&str] = &[
    "BindColor",
    "BindEdge",
    "BindType",
    "BindWhen",
    "Booklet",
    "FoldType",
    "FoldWhen",
    "HPStaplerOptions",
    "Jog",
    "Slipsheet",
    "Sorter",
    "StapleLocation",
    "StapleOrientation",
    "StapleWhen",
    "StapleX",
    "StapleY",
];

const FINISHING_GROUPS: &[&str] = &[
    "FPFinishing1",
    "FPFinishing2",
    "FPFinishing3",
    "FPFinishing4",
    "FinishingPage",
    "HPFinishingPanel",
];

/// PPD options the dialog never shows; copies, collation, page order and
/// page size are set from the job instead.
const OPTION_BLACKLIST: &[&str] = &["Collate", "Copies", "OutputOrder", "PageRegion", "PageSize"];

/// Options in this PPD group describe installed hardware, not job choices.
const INSTALLABLE_GROUP: &str = "InstallableOptions";

pub const COLOR_PAGE: &str = "ColorPage";
pub const IMAGE_QUALITY_PAGE: &str = "ImageQualityPage";
pub const FINISHING_PAGE: &str = "FinishingPage";

/// PPD keywords with a dialog-level name; the rest become `cups-<keyword>`.
const OPTION_NAMES: &[(&str, &str)] = &[
    ("Duplex", "duplex"),
    ("MediaType", "paper-type"),
    ("InputSlot", "paper-source"),
    ("OutputBin", "output-tray"),
];

const OPTION_TEXT: &[(&str, &str)] = &[
    ("Duplex", "Two Sided"),
    ("MediaType", "Paper Type"),
    ("InputSlot", "Paper Source"),
    ("OutputBin", "Output Tray"),
];

const CHOICE_TEXT: &[(&str, &str, &str)] = &[
    ("Duplex", "None", "One Sided"),
    ("InputSlot", "Auto", "Auto Select"),
    ("InputSlot", "AutoSelect", "Auto Select"),
    ("InputSlot", "Default", "Printer Default"),
    ("InputSlot", "None", "Printer Default"),
    ("InputSlot", "PrinterDefault", "Printer Default"),
    ("InputSlot", "Unspecified", "Auto Select"),
];

fn in_table(value: &str, table: &[&str]) -> bool {
    table.binary_search(&value).is_ok()
}

/// Dialog name for a PPD option keyword.
pub fn option_name(keyword: &str) -> String {
    OPTION_NAMES
        .iter()
        .find(|(ppd, _)| *ppd == keyword)
        .map(|(_, name)| (*name).to_string())
        .unwrap_or_else(|| format!("cups-{keyword}"))
}

/// `None`, `Off` and `False` all switch a PPD feature off.
pub fn value_is_off(value: &str) -> bool {
    ["None", "Off", "False"]
        .iter()
        .any(|off| value.eq_ignore_ascii_case(off))
}

// -- setting maps -----------------------------------------------------------

/// One row of a translation between a PPD choice and a generic setting.
#[derive(Debug, Clone, Copy)]
enum Mapping {
    /// A PPD choice and its generic equivalent.
    Pair(&'static str, &'static str),
    /// The generic value meaning the feature is off.
    Off(&'static str),
    /// Any value passes through unchanged.
    PassThrough,
}

use Mapping::{Off, Pair, PassThrough};

const PAPER_SOURCE_MAP: &[Mapping] = &[
    Pair("Lower", "lower"),
    Pair("Middle", "middle"),
    Pair("Upper", "upper"),
    Pair("Rear", "rear"),
    Pair("Envelope", "envelope"),
    Pair("Cassette", "cassette"),
    Pair("LargeCapacity", "large-capacity"),
    Pair("AnySmallFormat", "small-format"),
    Pair("AnyLargeFormat", "large-format"),
    PassThrough,
];

const OUTPUT_TRAY_MAP: &[Mapping] = &[
    Pair("Upper", "upper"),
    Pair("Lower", "lower"),
    Pair("Rear", "rear"),
    PassThrough,
];

const DUPLEX_MAP: &[Mapping] = &[
    Pair("DuplexTumble", "vertical"),
    Pair("DuplexNoTumble", "horizontal"),
    Off("simplex"),
];

const OUTPUT_MODE_MAP: &[Mapping] = &[
    Pair("Standard", "normal"),
    Pair("Normal", "normal"),
    Pair("Draft", "draft"),
    Pair("Fast", "draft"),
];

const MEDIA_TYPE_MAP: &[Mapping] = &[
    Pair("Transparency", "transparency"),
    Pair("Standard", "stationery"),
    PassThrough,
];

const ALL_MAP: &[Mapping] = &[PassThrough];

/// Options whose value round-trips through a generic setting.
/// `(option name, map, generic key, cups name)`.
const MAPPED_OPTIONS: &[(&str, &[Mapping], &str, &str)] = &[
    ("paper-source", PAPER_SOURCE_MAP, keys::DEFAULT_SOURCE, "InputSlot"),
    ("output-tray", OUTPUT_TRAY_MAP, keys::OUTPUT_BIN, "OutputBin"),
    ("duplex", DUPLEX_MAP, keys::DUPLEX, "Duplex"),
    ("cups-OutputMode", OUTPUT_MODE_MAP, keys::QUALITY, "OutputMode"),
    ("paper-type", MEDIA_TYPE_MAP, keys::MEDIA_TYPE, "MediaType"),
    ("n-up", ALL_MAP, keys::NUMBER_UP, "number-up"),
];

/// CUPS job options copied straight to and from a setting.
/// `(option name, setting key)`.
const COPIED_OPTIONS: &[(&str, &str)] = &[
    ("job-priority", "cups-job-priority"),
    ("cover-before", keys::COVER_BEFORE),
    ("cover-after", keys::COVER_AFTER),
    ("print-at", keys::PRINT_AT),
    ("print-at-time", keys::PRINT_AT_TIME),
];

const BILLING_SETTING: &str = "cups-job-billing";

// -- options ----------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    PickOne,
    Boolean,
    /// Free text.
    Text,
}

/// One option as a dialog presents it.
#[derive(Debug, Clone, PartialEq)]
pub struct PrinterOption {
    pub name: String,
    pub text: String,
    pub kind: OptionKind,
    /// `(value, display text)`; empty for free text.
    pub choices: Vec<(String, String)>,
    pub value: String,
    /// Dialog page; the PPD group text unless a table claims the option.
    pub group: String,
    pub has_conflict: bool,
}

impl PrinterOption {
    fn new(name: &str, text: &str, kind: OptionKind) -> Self {
        Self {
            name: name.to_string(),
            text: text.to_string(),
            kind,
            choices: Vec::new(),
            value: String::new(),
            group: String::new(),
            has_conflict: false,
        }
    }

    fn pick_one(name: &str, text: &str, values: &[&str], display: &[&str], default: &str) -> Self {
        let mut option = Self::new(name, text, OptionKind::PickOne);
        option.choices = values
            .iter()
            .zip(display)
            .map(|(v, d)| ((*v).to_string(), (*d).to_string()))
            .collect();
        option.value = default.to_string();
        option
    }

    fn text_entry(name: &str, text: &str) -> Self {
        Self::new(name, text, OptionKind::Text)
    }

    /// Set the value.  Choice options ignore values they do not offer.
    pub fn set(&mut self, value: &str) -> bool {
        if self.kind != OptionKind::Text && !self.choices.iter().any(|(v, _)| v == value) {
            debug!(option = %self.name, value, "value not offered");
            return false;
        }
        self.value = value.to_string();
        true
    }

    /// Select the choice that switches the feature off, if there is one.
    fn set_off(&mut self) {
        if let Some((off, _)) = self.choices.iter().find(|(v, _)| value_is_off(v)) {
            self.value = off.clone();
        }
    }
}

/// A printer's options, in the order a dialog lists them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OptionSet {
    options: Vec<PrinterOption>,
}

impl OptionSet {
    pub fn lookup(&self, name: &str) -> Option<&PrinterOption> {
        self.options.iter().find(|o| o.name == name)
    }

    pub fn lookup_mut(&mut self, name: &str) -> Option<&mut PrinterOption> {
        self.options.iter_mut().find(|o| o.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PrinterOption> {
        self.options.iter()
    }

    pub fn len(&self) -> usize {
        self.options.len()
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    /// Set an option's value; `false` if the option is unknown or refuses it.
    pub fn set(&mut self, name: &str, value: &str) -> bool {
        self.lookup_mut(name).is_some_and(|o| o.set(value))
    }

    /// A later option replaces an earlier one of the same name.
    fn add(&mut self, option: PrinterOption) {
        match self.lookup_mut(&option.name) {
            Some(existing) => *existing = option,
            None => self.options.push(option),
        }
    }

    /// Flag the options involved in a violated PPD constraint, marking each
    /// PPD option with the value chosen here.  Returns whether any conflict
    /// exists.
    pub fn mark_conflicts(&mut self, ppd: &PpdFile) -> bool {
        for option in &mut self.options {
            option.has_conflict = false;
        }
        let marked: HashMap<String, String> = ppd
            .options()
            .filter_map(|p| {
                self.lookup(&option_name(&p.keyword))
                    .map(|o| (p.keyword.clone(), o.value.clone()))
            })
            .collect();

        let conflicting = ppd.conflicts(&marked);
        for keyword in &conflicting {
            match self.lookup_mut(&option_name(keyword)) {
                Some(option) => option.has_conflict = true,
                None => debug!(keyword = %keyword, "conflict on an option not shown"),
            }
        }
        !conflicting.is_empty()
    }
}

/// Build the option set for a printer, preset from `settings` when given.
/// Without a PPD only the CUPS job options are offered.
pub fn printer_options(ppd: Option<&PpdFile>, settings: Option<&JobSettings>) -> OptionSet {
    const N_UP: &[&str] = &["1", "2", "4", "6", "9", "16"];
    const PRIORITY: &[&str] = &["100", "80", "50", "30"];
    const PRIORITY_TEXT: &[&str] = &["Urgent", "High", "Medium", "Low"];
    const COVER: &[&str] = &[
        "none",
        "classified",
        "confidential",
        "secret",
        "standard",
        "topsecret",
        "unclassified",
    ];
    const COVER_TEXT: &[&str] = &[
        "None",
        "Classified",
        "Confidential",
        "Secret",
        "Standard",
        "Top Secret",
        "Unclassified",
    ];
    const PRINT_AT: &[&str] = &["now", "at", "on-hold"];

    let mut set = OptionSet::default();
    let job_options = [
        PrinterOption::pick_one("n-up", "Pages Per Sheet", N_UP, N_UP, "1"),
        PrinterOption::pick_one("job-priority", "Job Priority", PRIORITY, PRIORITY_TEXT, "50"),
        PrinterOption::text_entry("billing-info", "Billing Info"),
        PrinterOption::pick_one("cover-before", "Before", COVER, COVER_TEXT, "none"),
        PrinterOption::pick_one("cover-after", "After", COVER, COVER_TEXT, "none"),
        PrinterOption::pick_one("print-at", "Print at", PRINT_AT, PRINT_AT, "now"),
        PrinterOption::text_entry("print-at-time", "Print at time"),
    ];
    let ppd_options = ppd
        .into_iter()
        .flat_map(|ppd| ppd.groups.iter())
        .filter(|group| {
            let installable = group.name == INSTALLABLE_GROUP;
            if installable {
                debug!(options = group.options.len(), "skipping installable options");
            }
            !installable
        })
        .flat_map(|group| group.options.iter().filter_map(move |o| option_from_ppd(group, o)));

    for mut option in job_options.into_iter().chain(ppd_options) {
        if let Some(settings) = settings {
            apply_setting(&mut option, settings);
        }
        set.add(option);
    }
    set
}

fn option_from_ppd(group: &PpdGroup, ppd_option: &PpdOption) -> Option<PrinterOption> {
    let keyword = ppd_option.keyword.as_str();
    if in_table(keyword, OPTION_BLACKLIST) {
        return None;
    }

    let name = option_name(keyword);
    let text = OPTION_TEXT
        .iter()
        .find(|(k, _)| *k == keyword)
        .map(|(_, t)| (*t).to_string())
        .unwrap_or_else(|| ppd_option.text.trim_end().to_string());

    let mut option = match ppd_option.ui {
        UiKind::PickOne if !ppd_option.choices.is_empty() => {
            let mut option = PrinterOption::new(&name, &text, OptionKind::PickOne);
            option.choices = ppd_option
                .choices
                .iter()
                .map(|c| (c.choice.clone(), choice_text(keyword, c)))
                .collect();
            option
        }
        UiKind::Boolean if ppd_option.choices.len() == 2 => {
            let mut option = PrinterOption::new(&name, &text, OptionKind::Boolean);
            option.choices = ["True", "False"]
                .iter()
                .map(|c| ((*c).to_string(), (*c).to_string()))
                .collect();
            option
        }
        _ => {
            debug!(keyword, ui = ?ppd_option.ui, "option not offered");
            return None;
        }
    };
    if let Some(default) = &ppd_option.default_choice {
        option.set(default);
    }

    let page = if in_table(&group.name, COLOR_GROUPS) || in_table(keyword, COLOR_OPTIONS) {
        Some(COLOR_PAGE)
    } else if in_table(&group.name, IMAGE_QUALITY_GROUPS) || in_table(keyword, IMAGE_QUALITY_OPTIONS)
    {
        Some(IMAGE_QUALITY_PAGE)
    } else if in_table(&group.name, FINISHING_GROUPS) || in_table(keyword, FINISHING_OPTIONS) {
        Some(FINISHING_PAGE)
    } else {
        None
    };
    option.group = page.map_or_else(|| group.text.clone(), str::to_string);
    Some(option)
}

fn choice_text(keyword: &str, choice: &PpdChoice) -> String {
    CHOICE_TEXT
        .iter()
        .find(|(k, c, _)| *k == keyword && *c == choice.choice)
        .map(|(_, _, t)| (*t).to_string())
        .unwrap_or_else(|| choice.text.clone())
}

/// Preset one option from the job settings.
fn apply_setting(option: &mut PrinterOption, settings: &JobSettings) {
    let get = |key: &str| settings.options.get(key).map(String::as_str);
    let name = option.name.as_str();

    if let Some((_, map, standard, cups)) = MAPPED_OPTIONS.iter().find(|(n, ..)| *n == name) {
        if let Some(value) = get(&format!("cups-{cups}")) {
            option.set(value);
            return;
        }
        let Some(standard_value) = get(*standard) else {
            return;
        };
        for mapping in *map {
            match *mapping {
                PassThrough => {
                    option.set(standard_value);
                    return;
                }
                Off(off) if off == standard_value => {
                    option.set_off();
                    return;
                }
                Pair(choice, generic) if generic == standard_value => {
                    option.set(choice);
                    return;
                }
                _ => {}
            }
        }
        return;
    }

    let value = match name {
        "cups-Resolution" => get(name).map(str::to_string).or_else(|| {
            get(keys::RESOLUTION)
                .and_then(|r| r.parse::<u32>().ok())
                .filter(|r| *r != 0)
                .map(|r| format!("{r}dpi"))
        }),
        "billing-info" => get(BILLING_SETTING).map(str::to_string),
        _ => match COPIED_OPTIONS.iter().find(|(n, _)| *n == name) {
            Some((_, key)) => get(*key).map(str::to_string),
            None if name.starts_with("cups-") => get(name).map(str::to_string),
            None => None,
        },
    };
    if let Some(value) = value {
        option.set(&value);
    }
}

/// Leading decimal digits of `value`, or 0.
fn leading_number(value: &str) -> u32 {
    let end = value.find(|c: char| !c.is_ascii_digit()).unwrap_or(value.len());
    value[..end].parse().unwrap_or(0)
}

/// Write the chosen options back into job settings: every option under its
/// setting key, mapped options also under their generic key, cover pages
/// as `cups-job-sheets` and a deferred start as `cups-job-hold-until`.
pub fn settings_from_options(options: &OptionSet, settings: &mut JobSettings) {
    let out = &mut settings.options;
    for option in options.iter() {
        let name = option.name.as_str();
        let value = option.value.as_str();

        if let Some((_, map, standard, cups)) = MAPPED_OPTIONS.iter().find(|(n, ..)| *n == name) {
            for mapping in *map {
                match *mapping {
                    PassThrough => {
                        out.insert((*standard).to_string(), value.to_string());
                        break;
                    }
                    Off(off) if value_is_off(value) => {
                        out.insert((*standard).to_string(), off.to_string());
                        break;
                    }
                    Pair(choice, generic) if choice == value => {
                        out.insert((*standard).to_string(), generic.to_string());
                        break;
                    }
                    _ => {}
                }
            }
            out.insert(format!("cups-{cups}"), value.to_string());
            continue;
        }

        match name {
            "cups-Resolution" => {
                let dpi = leading_number(value);
                if dpi != 0 {
                    out.insert(keys::RESOLUTION.to_string(), dpi.to_string());
                }
                out.insert(name.to_string(), value.to_string());
            }
            "billing-info" => {
                if !value.is_empty() {
                    out.insert(BILLING_SETTING.to_string(), value.to_string());
                }
            }
            _ => match COPIED_OPTIONS.iter().find(|(n, _)| *n == name) {
                Some((_, key)) => {
                    out.insert((*key).to_string(), value.to_string());
                }
                None if name.starts_with("cups-") => {
                    out.insert(name.to_string(), value.to_string());
                }
                None => {}
            },
        }
    }

    if let (Some(before), Some(after)) = (options.lookup("cover-before"), options.lookup("cover-after"))
    {
        out.insert(
            "cups-job-sheets".to_string(),
            format!("{},{}", before.value, after.value),
        );
    }

    let hold = match out.get(keys::PRINT_AT).map(String::as_str) {
        Some("at") => out.get(keys::PRINT_AT_TIME).cloned(),
        Some("on-hold") => Some("indefinite".to_string()),
        _ => None,
    };
    if let Some(hold) = hold {
        out.insert("cups-job-hold-until".to_string(), hold);
    }
}

// -- job preparation --------------------------------------------------------

/// The paper a job is laid out on.
#[derive(Debug, Clone, PartialEq)]
pub enum Paper {
    /// A PPD size name, e.g. `A4`.
    Ppd(String),
    /// Width and height in points.
    Custom { width: f64, height: f64 },
}

impl Paper {
    /// The `PageSize` value naming this paper.
    pub fn page_size(&self) -> String {
        match self {
            Paper::Ppd(name) => name.clone(),
            Paper::Custom { width, height } => format!("Custom.{width:.2}x{height:.2}"),
        }
    }
}

/// Zero-based, inclusive.  `end` of `None` runs to the last page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRange {
    pub start: u32,
    pub end: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrintPages {
    All,
    Current,
    Ranges(Vec<PageRange>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSet {
    All,
    Even,
    Odd,
}

/// What the client renderer still has to do once the server has taken over
/// copies, collation, page order and page-set selection.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedJob {
    pub pages: PrintPages,
    pub copies: u32,
    pub collate: bool,
    pub reverse: bool,
    /// 1.0 = unscaled.
    pub scale: f64,
    pub page_set: PageSet,
    pub rotate_to_orientation: bool,
}

/// Parse `1-3,5,8-` (one-based) into zero-based ranges.  Malformed pieces
/// are skipped.
pub fn parse_page_ranges(text: &str) -> Vec<PageRange> {
    let page = |s: &str| s.trim().parse::<u32>().ok().filter(|p| *p > 0).map(|p| p - 1);
    text.split(',')
        .filter_map(|piece| match piece.split_once('-') {
            Some((start, end)) if end.trim().is_empty() => Some(PageRange {
                start: page(start)?,
                end: None,
            }),
            Some((start, end)) => Some(PageRange {
                start: page(start)?,
                end: Some(page(end)?),
            }),
            None => {
                let single = page(piece)?;
                Some(PageRange {
                    start: single,
                    end: Some(single),
                })
            }
        })
        .collect()
}

/// Hand copies, collation, page order, page set and paper size to the
/// server by way of `cups-` settings, and return what is left for the
/// renderer.
pub fn prepare_for_print(settings: &mut JobSettings, paper: Option<&Paper>) -> PreparedJob {
    let out = &mut settings.options;
    let flag = |key: &str| out.get(key).is_some_and(|v| v.eq_ignore_ascii_case("true"));
    let collate = flag(keys::COLLATE);
    let reverse = flag(keys::REVERSE);

    let pages = match out.get(keys::PRINT_PAGES).map(String::as_str) {
        Some("ranges") => PrintPages::Ranges(
            out.get(keys::PAGE_RANGES)
                .map(|r| parse_page_ranges(r.as_str()))
                .unwrap_or_default(),
        ),
        Some("current") => PrintPages::Current,
        _ => PrintPages::All,
    };
    let copies = out
        .get(keys::N_COPIES)
        .and_then(|n| n.parse::<u32>().ok())
        .unwrap_or(1);
    let scale = out
        .get(keys::SCALE)
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(100.0);
    let page_set = match out.get(keys::PAGE_SET).map(String::as_str) {
        Some("even") => Some("even"),
        Some("odd") => Some("odd"),
        _ => None,
    };

    if collate {
        out.insert("cups-Collate".into(), "True".into());
    }
    if reverse {
        out.insert("cups-OutputOrder".into(), "Reverse".into());
    }
    if copies > 1 {
        out.insert("cups-copies".into(), copies.to_string());
    }
    if let Some(page_set) = page_set {
        out.insert("cups-page-set".into(), page_set.into());
    }
    if let Some(paper) = paper {
        out.insert("cups-PageSize".into(), paper.page_size());
    }

    PreparedJob {
        pages,
        copies: 1,
        collate: false,
        reverse: false,
        scale: if scale == 100.0 { 1.0 } else { scale / 100.0 },
        page_set: PageSet::All,
        rotate_to_orientation: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PPD: &str = r#"*PPD-Adobe: "4.3"
*OpenGroup: General/General
*OpenUI *PageSize/Media Size: PickOne
*DefaultPageSize: A4
*PageSize A4/A4: ""
*PageSize Letter/US Letter: ""
*CloseUI: *PageSize
*OpenUI *Duplex/Double-Sided Printing: PickOne
*DefaultDuplex: None
*Duplex None/Off: ""
*Duplex DuplexNoTumble/Long Edge: ""
*Duplex DuplexTumble/Short Edge: ""
*CloseUI: *Duplex
*OpenUI *InputSlot/Media Source: PickOne
*DefaultInputSlot: Auto
*InputSlot Auto/Automatic: ""
*InputSlot Upper/Tray 1: ""
*InputSlot Lower/Tray 2: ""
*CloseUI: *InputSlot
*OpenUI *ColorModel/Color Mode: PickOne
*DefaultColorModel: RGB
*ColorModel RGB/Color: ""
*ColorModel Gray/Grayscale: ""
*CloseUI: *ColorModel
*OpenUI *Resolution/Resolution: PickOne
*DefaultResolution: 600dpi
*Resolution 300dpi/300 DPI: ""
*Resolution 600dpi/600 DPI: ""
*CloseUI: *Resolution
*OpenUI *Toner/Toner Saving : Boolean
*DefaultToner: False
*Toner True/On: ""
*Toner False/Off: ""
*CloseUI: *Toner
*OpenUI *Layers/Layers: PickMany
*Layers A/A: ""
*CloseUI: *Layers
*CloseGroup: General
*OpenGroup: InstallableOptions/Installed Hardware
*OpenUI *Option1/Duplexer: Boolean
*DefaultOption1: True
*Option1 True/Installed: ""
*Option1 False/Not Installed: ""
*CloseUI: *Option1
*CloseGroup: InstallableOptions
*OpenGroup: HPFinishingPanel/Finishing
*OpenUI *Fold/Fold: PickOne
*DefaultFold: Off
*Fold Off/Off: ""
*Fold Half/Half: ""
*CloseUI: *Fold
*CloseGroup: HPFinishingPanel
*UIConstraints: *Duplex DuplexNoTumble *InputSlot Lower
"#;

    fn ppd() -> PpdFile {
        PpdFile::parse_str(PPD).unwrap()
    }

    fn settings(pairs: &[(&str, &str)]) -> JobSettings {
        let mut settings = JobSettings::new("report");
        for (k, v) in pairs {
            settings.options.insert((*k).into(), (*v).into());
        }
        settings
    }

    #[test]
    fn dialog_tables_are_sorted() {
        for table in [
            COLOR_OPTIONS,
            COLOR_GROUPS,
            IMAGE_QUALITY_OPTIONS,
            IMAGE_QUALITY_GROUPS,
            FINISHING_OPTIONS,
            FINISHING_GROUPS,
            OPTION_BLACKLIST,
        ] {
            assert!(table.windows(2).all(|w| w[0] < w[1]), "{table:?}");
        }
    }

    #[test]
    fn off_values_ignore_case() {
        assert!(value_is_off("none"));
        assert!(value_is_off("OFF"));
        assert!(value_is_off("False"));
        assert!(!value_is_off("DuplexTumble"));
    }

    #[test]
    fn job_options_exist_without_ppd() {
        let set = printer_options(None, None);
        assert_eq!(set.len(), 7);
        assert_eq!(set.lookup("n-up").unwrap().value, "1");
        assert_eq!(set.lookup("job-priority").unwrap().value, "50");
        assert_eq!(set.lookup("print-at-time").unwrap().kind, OptionKind::Text);
    }

    #[test]
    fn ppd_options_are_filtered_and_paged() {
        let set = printer_options(Some(&ppd()), None);

        // Blacklisted, installable and pick-many options are left out.
        assert!(set.lookup("cups-PageSize").is_none());
        assert!(set.lookup("cups-Option1").is_none());
        assert!(set.lookup("cups-Layers").is_none());

        let duplex = set.lookup("duplex").unwrap();
        assert_eq!(duplex.text, "Two Sided");
        assert_eq!(duplex.value, "None");
        assert_eq!(duplex.choices[0].1, "One Sided");
        assert_eq!(duplex.group, "General");

        let source = set.lookup("paper-source").unwrap();
        assert_eq!(source.choices[0], ("Auto".into(), "Auto Select".into()));

        assert_eq!(set.lookup("cups-ColorModel").unwrap().group, COLOR_PAGE);
        assert_eq!(set.lookup("cups-Resolution").unwrap().group, IMAGE_QUALITY_PAGE);
        assert_eq!(set.lookup("cups-Fold").unwrap().group, FINISHING_PAGE);

        let toner = set.lookup("cups-Toner").unwrap();
        assert_eq!(toner.kind, OptionKind::Boolean);
        assert_eq!(toner.text, "Toner Saving");
        assert_eq!(toner.value, "False");
    }

    #[test]
    fn generic_settings_preset_options() {
        let s = settings(&[
            (keys::DUPLEX, "vertical"),
            (keys::DEFAULT_SOURCE, "lower"),
            (keys::RESOLUTION, "300"),
            (keys::NUMBER_UP, "4"),
            ("cups-job-billing", "dept-7"),
            (keys::PRINT_AT, "on-hold"),
        ]);
        let set = printer_options(Some(&ppd()), Some(&s));
        assert_eq!(set.lookup("duplex").unwrap().value, "DuplexTumble");
        assert_eq!(set.lookup("paper-source").unwrap().value, "Lower");
        assert_eq!(set.lookup("cups-Resolution").unwrap().value, "300dpi");
        assert_eq!(set.lookup("n-up").unwrap().value, "4");
        assert_eq!(set.lookup("billing-info").unwrap().value, "dept-7");
        assert_eq!(set.lookup("print-at").unwrap().value, "on-hold");
    }

    #[test]
    fn cups_setting_wins_over_generic_one() {
        let s = settings(&[(keys::DUPLEX, "vertical"), ("cups-Duplex", "DuplexNoTumble")]);
        let set = printer_options(Some(&ppd()), Some(&s));
        assert_eq!(set.lookup("duplex").unwrap().value, "DuplexNoTumble");
    }

    #[test]
    fn simplex_selects_the_off_choice() {
        let s = settings(&[("cups-Duplex", "DuplexTumble")]);
        let mut set = printer_options(Some(&ppd()), Some(&s));
        assert_eq!(set.lookup("duplex").unwrap().value, "DuplexTumble");

        let s = settings(&[(keys::DUPLEX, "simplex")]);
        let option = set.lookup_mut("duplex").unwrap();
        apply_setting(option, &s);
        assert_eq!(option.value, "None");
    }

    #[test]
    fn unknown_choice_is_refused() {
        let mut set = printer_options(Some(&ppd()), None);
        assert!(!set.set("duplex", "Sideways"));
        assert!(set.set("billing-info", "anything"));
        assert!(!set.set("no-such-option", "x"));
    }

    #[test]
    fn options_write_back_generic_and_cups_settings() {
        let mut set = printer_options(Some(&ppd()), None);
        set.set("duplex", "DuplexNoTumble");
        set.set("paper-source", "Auto");
        set.set("cups-Resolution", "600dpi");
        set.set("cover-before", "confidential");
        set.set("print-at", "at");
        set.set("print-at-time", "22:00");

        let mut s = JobSettings::new("report");
        settings_from_options(&set, &mut s);
        let get = |k: &str| s.options.get(k).map(String::as_str);

        assert_eq!(get(keys::DUPLEX), Some("horizontal"));
        assert_eq!(get("cups-Duplex"), Some("DuplexNoTumble"));
        // Unlisted choices pass through to the generic key.
        assert_eq!(get(keys::DEFAULT_SOURCE), Some("Auto"));
        assert_eq!(get(keys::RESOLUTION), Some("600"));
        assert_eq!(get("cups-Resolution"), Some("600dpi"));
        assert_eq!(get("cups-ColorModel"), Some("RGB"));
        assert_eq!(get("cups-job-sheets"), Some("confidential,none"));
        assert_eq!(get("cups-job-hold-until"), Some("22:00"));
        assert_eq!(get("cups-job-billing"), None);
    }

    #[test]
    fn duplex_off_writes_simplex() {
        let mut set = printer_options(Some(&ppd()), None);
        set.set("duplex", "None");
        let mut s = JobSettings::new("report");
        settings_from_options(&set, &mut s);
        assert_eq!(s.options.get(keys::DUPLEX).map(String::as_str), Some("simplex"));
    }

    #[test]
    fn held_job_waits_indefinitely() {
        let mut set = printer_options(None, None);
        set.set("print-at", "on-hold");
        let mut s = JobSettings::new("report");
        settings_from_options(&set, &mut s);
        assert_eq!(
            s.options.get("cups-job-hold-until").map(String::as_str),
            Some("indefinite")
        );
    }

    #[test]
    fn conflicts_are_flagged_on_both_options() {
        let ppd = ppd();
        let mut set = printer_options(Some(&ppd), None);
        assert!(!set.mark_conflicts(&ppd));

        set.set("duplex", "DuplexNoTumble");
        set.set("paper-source", "Lower");
        assert!(set.mark_conflicts(&ppd));
        assert!(set.lookup("duplex").unwrap().has_conflict);
        assert!(set.lookup("paper-source").unwrap().has_conflict);
        assert!(!set.lookup("cups-ColorModel").unwrap().has_conflict);

        set.set("paper-source", "Upper");
        assert!(!set.mark_conflicts(&ppd));
        assert!(!set.lookup("duplex").unwrap().has_conflict);
    }

    #[test]
    fn page_ranges_are_zero_based() {
        assert_eq!(
            parse_page_ranges("1-3, 5,8-,x,0"),
            vec![
                PageRange { start: 0, end: Some(2) },
                PageRange { start: 4, end: Some(4) },
                PageRange { start: 7, end: None },
            ]
        );
    }

    #[test]
    fn preparation_hands_work_to_the_server() {
        let mut s = settings(&[
            (keys::COLLATE, "true"),
            (keys::REVERSE, "TRUE"),
            (keys::N_COPIES, "3"),
            (keys::SCALE, "50"),
            (keys::PAGE_SET, "odd"),
            (keys::PRINT_PAGES, "ranges"),
            (keys::PAGE_RANGES, "2-4"),
        ]);
        let prepared = prepare_for_print(&mut s, Some(&Paper::Ppd("A4".into())));

        assert_eq!(prepared.copies, 1);
        assert!(!prepared.collate && !prepared.reverse);
        assert_eq!(prepared.scale, 0.5);
        assert_eq!(prepared.page_set, PageSet::All);
        assert!(prepared.rotate_to_orientation);
        assert_eq!(
            prepared.pages,
            PrintPages::Ranges(vec![PageRange { start: 1, end: Some(3) }])
        );

        let options: Vec<_> = s.cups_options().collect();
        assert_eq!(
            options,
            vec![
                ("Collate", "True"),
                ("OutputOrder", "Reverse"),
                ("PageSize", "A4"),
                ("copies", "3"),
                ("page-set", "odd"),
            ]
        );
    }

    #[test]
    fn single_copy_defaults_add_nothing() {
        let mut s = settings(&[(keys::N_COPIES, "1"), (keys::SCALE, "100")]);
        let prepared = prepare_for_print(&mut s, None);
        assert_eq!(prepared.scale, 1.0);
        assert_eq!(prepared.pages, PrintPages::All);
        assert_eq!(s.cups_options().count(), 0);
    }

    #[test]
    fn custom_paper_is_named_by_its_size() {
        let paper = Paper::Custom { width: 300.0, height: 432.5 };
        assert_eq!(paper.page_size(), "Custom.300.00x432.50");
    }

    #[test]
    fn cups_capabilities() {
        let caps = Capabilities::CUPS;
        assert!(caps.copies && caps.collate && caps.reverse);
    }
}
