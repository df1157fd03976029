//! Canonical term registry (the lexicon)
//!
//! Every field the system knows about has one canonical id ([`LexId`]).
//! Spreadsheet headers, UI labels and template placeholders are external
//! names that resolve to a `LexId` through [`Lexicon::normalize`]; internal
//! code compares ids, never raw strings.
//!
//! Ids are persisted as their string token (`"SC_TOPIC"`), never as an
//! ordinal. New ids are appended to the end of [`LexId`]; existing ids are
//! never renamed or removed, so data stored for past courses stays valid.
//!
//! # Normalization
//!
//! A raw term is trimmed, lowercased and stripped of spaces, underscores,
//! hyphens, colons and dots before lookup. `"Sub-Topic"`, `"sub topic"` and
//! `"SC_SUBTOPIC"` all resolve to [`LexId::ScSubtopic`].

use crate::error::{Error, ReferentialError, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Canonical lexicon ids (append-only)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LexId {
    // Course-level metadata
    CInfo,
    CName,
    CLevel,
    CTheme,
    CDuration,
    CCode,
    CDev,
    CDesc,

    // Learning objectives
    Clo,

    // Scalar manager and structure
    Scalemgr,
    ScLesson,
    ScTopic,
    ScSubtopic,
    ScPc,

    // Content manager
    Contmgr,
    CtResource,
    CtTag,
    CtNote,

    // Lesson manager and slide structure
    Lsnmgr,
    SlTitle,
    SlSubtitle,
    SlHeading,
    SlSubheading,
    SlBody,
    SlBullets,
    SlImage,
    SlQuote,
    SlLabel,
    SlTable,

    // References
    RefEntry,
    RefAuthor,
    RefTitle,
    RefYear,
    RefUrl,
    RefType,

    // Assessments
    ExQ,
    ExOpt,
    ExKey,
    ExExp,
    ExDiff,
    ExTopic,

    // System terms
    PkeEngine,
    PkeTerm,
    PkeResp,
    TplMap,
    ExpEngine,
    SsState,
    UiPanel,
    UiConnect,

    // Template and layout blocks for exports
    TplTitleBlock,
    TplSubtitleBlock,
    TplBody,
    TplBullets,
    TplTable,
    TplImage,
    TplSlideNo,
    TplFooterLeft,
    TplFooterMid,
    TplFooterRight,
    TplHeaderLeft,
    TplHeaderRight,
}

impl LexId {
    /// Stable token used for persistence and display
    pub fn as_str(self) -> &'static str {
        builtin_row(self).token
    }

    /// Every id in registration order
    pub fn all() -> impl Iterator<Item = LexId> {
        BUILTIN.iter().map(|row| row.id)
    }
}

impl fmt::Display for LexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LexId {
    type Err = Error;

    /// Parse an exact id token (`"SC_TOPIC"`); use [`Lexicon::normalize`] for
    /// free-text terms.
    fn from_str(s: &str) -> Result<Self> {
        BUILTIN
            .iter()
            .find(|row| row.token == s)
            .map(|row| row.id)
            .ok_or_else(|| {
                ReferentialError::UnknownTerm {
                    term: s.to_string(),
                }
                .into()
            })
    }
}

/// Metadata for a single lexicon item
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LexiconEntry {
    pub id: LexId,
    pub primary_term: &'static str,
    pub variants: &'static [&'static str],
    pub category: &'static str,
    pub notes: &'static str,
}

struct BuiltinRow {
    id: LexId,
    token: &'static str,
    entry: LexiconEntry,
}

const fn row(
    id: LexId,
    token: &'static str,
    primary_term: &'static str,
    variants: &'static [&'static str],
    category: &'static str,
    notes: &'static str,
) -> BuiltinRow {
    BuiltinRow {
        id,
        token,
        entry: LexiconEntry {
            id,
            primary_term,
            variants,
            category,
            notes,
        },
    }
}

// Order matters: when two entries share a variant the earlier one keeps it.
static BUILTIN: &[BuiltinRow] = &[
    row(LexId::CInfo, "C_INFO", "Course Information",
        &["course information", "course info", "course details", "metadata"],
        "course", "Logical container for all course-level metadata."),
    row(LexId::CName, "C_NAME", "Course Title",
        &["course title", "course name", "title", "name"],
        "course", "Display name of the course."),
    row(LexId::CLevel, "C_LEVEL", "Course Level",
        &["course level", "level", "difficulty level"],
        "course", "Basic / Intermediate / Advanced / Executive / Custom."),
    row(LexId::CTheme, "C_THEME", "Thematic Area",
        &["thematic", "theme", "thematic area", "category"],
        "course", "High-level subject or stream."),
    row(LexId::CDuration, "C_DURATION", "Duration",
        &["duration", "course duration", "length"],
        "course", "Integer days or a label such as '3 Days'."),
    row(LexId::CCode, "C_CODE", "Course Code",
        &["course code", "code", "identifier"],
        "course", "Optional external identifier."),
    row(LexId::CDev, "C_DEV", "Developer Name",
        &["developer", "developer name", "course developer", "author"],
        "course", "Person or team responsible for the course."),
    row(LexId::CDesc, "C_DESC", "Course Description",
        &["course description", "description", "overview", "summary"],
        "course", "Narrative summary of the course."),
    row(LexId::Clo, "CLO", "Course Learning Objective",
        &["clo", "clos", "lo", "los", "learning objective", "learning objectives",
          "course learning objective", "course learning objectives"],
        "structure", "Root of the scalar; numbered 1, 2, 3."),
    row(LexId::Scalemgr, "SCALEMGR", "Scalar Manager",
        &["scalar", "scalar manager", "scalar table", "scalar index"],
        "structure", "Master structure for CLOs, topics, subtopics, lessons and PCs."),
    row(LexId::ScLesson, "SC_LESSON", "Lesson Title",
        &["lesson", "lessons", "lesson title", "lesson name"],
        "structure", "Indexed as 1.1.1.1."),
    row(LexId::ScTopic, "SC_TOPIC", "Topic",
        &["topic", "topics", "lesson topic", "module topic"],
        "structure", "Indexed as 1.1, 1.2."),
    row(LexId::ScSubtopic, "SC_SUBTOPIC", "Subtopic",
        &["subtopic", "subtopics", "sub-topic", "element"],
        "structure", "Indexed as 1.1.1, 1.1.2."),
    row(LexId::ScPc, "SC_PC", "Performance Criterion",
        &["performance criterion", "performance criteria", "pc", "pcs",
          "performance measure"],
        "structure", "Innermost scalar level."),
    row(LexId::Contmgr, "CONTMGR", "Content Manager",
        &["content manager", "content hub", "resources manager"],
        "content", "Hub for resource ingestion and organisation."),
    row(LexId::CtResource, "CT_RESOURCE", "Resource",
        &["resource", "file", "document", "attachment", "link", "media"],
        "content", "Unit of content (URL, image, PDF)."),
    row(LexId::CtTag, "CT_TAG", "Tag",
        &["tag", "label", "descriptor"],
        "content", "Used for search and filtering."),
    row(LexId::CtNote, "CT_NOTE", "Content Note",
        &["note", "notes", "annotation", "comment"],
        "content", "Free-text notes tied to a resource."),
    row(LexId::Lsnmgr, "LSNMGR", "Lesson Manager",
        &["lesson manager", "lessons manager", "lesson builder"],
        "lessons", "Assembly of lessons, slides, notes and timing."),
    row(LexId::SlTitle, "SL_TITLE", "Slide Title",
        &["slide title", "title block", "slide header"],
        "slide", "Primary title text on a slide."),
    row(LexId::SlSubtitle, "SL_SUBTITLE", "Slide Subtitle",
        &["subtitle", "slide subtitle"],
        "slide", "Secondary subtitle text on a slide."),
    row(LexId::SlHeading, "SL_HEADING", "Heading",
        &["heading", "section header", "h1"],
        "slide", "Main in-slide section heading."),
    row(LexId::SlSubheading, "SL_SUBHEADING", "Subheading",
        &["subheading", "sub-heading", "h2"],
        "slide", "Secondary in-slide heading."),
    row(LexId::SlBody, "SL_BODY", "Body Text",
        &["body", "body text", "paragraph", "text"],
        "slide", "Narrative body text."),
    row(LexId::SlBullets, "SL_BULLETS", "Bullet List",
        &["bullets", "bullet list", "bullet points", "list"],
        "slide", "One or more bullet items."),
    row(LexId::SlImage, "SL_IMAGE", "Image",
        &["image", "picture", "photo", "graphic"],
        "slide", "Single image on a slide."),
    row(LexId::SlQuote, "SL_QUOTE", "Quote",
        &["quote", "pull quote", "highlight quote"],
        "slide", "Quotation or highlighted statement."),
    row(LexId::SlLabel, "SL_LABEL", "Label",
        &["label", "tag", "marker"],
        "slide", "Short text label for diagram elements."),
    row(LexId::SlTable, "SL_TABLE", "Table",
        &["table", "data table", "grid"],
        "slide", "Tabular data element."),
    row(LexId::RefEntry, "REF_ENTRY", "Reference Entry",
        &["reference", "reference entry", "bibliography entry", "source"],
        "reference", "Single reference row."),
    row(LexId::RefAuthor, "REF_AUTHOR", "Author",
        &["author", "authors"],
        "reference", "Primary author list."),
    row(LexId::RefTitle, "REF_TITLE", "Reference Title",
        &["title", "reference title"],
        "reference", "Title of the work."),
    row(LexId::RefYear, "REF_YEAR", "Publication Year",
        &["year", "publication year", "date"],
        "reference", "Year of publication."),
    row(LexId::RefUrl, "REF_URL", "Reference URL",
        &["url", "link", "doi", "web address"],
        "reference", "Resolvable URL or DOI."),
    row(LexId::RefType, "REF_TYPE", "Reference Type",
        &["type", "source type", "format"],
        "reference", "Book, journal, website."),
    row(LexId::ExQ, "EX_Q", "Exam Question",
        &["question", "exam question", "mcq", "item"],
        "assessment", "Single assessment question."),
    row(LexId::ExOpt, "EX_OPT", "Answer Option",
        &["answer option", "option", "choice"],
        "assessment", "Single MCQ option."),
    row(LexId::ExKey, "EX_KEY", "Correct Answer",
        &["correct answer", "key", "answer key"],
        "assessment", "Identifier of the correct option."),
    row(LexId::ExExp, "EX_EXP", "Explanation",
        &["explanation", "rationale", "feedback"],
        "assessment", "Optional explanation or feedback."),
    row(LexId::ExDiff, "EX_DIFF", "Difficulty",
        &["difficulty", "difficulty level"],
        "assessment", "Simple difficulty tag (Easy/Med/Hard)."),
    row(LexId::ExTopic, "EX_TOPIC", "Question Topic",
        &["question topic", "topic"],
        "assessment", "Link back to a scalar topic or subtopic."),
    row(LexId::PkeEngine, "PKE_ENGINE", "Prometheus Knowledge Engine",
        &["pke", "prometheus ai", "ai engine"],
        "system", "Logical label for AI-assisted operations."),
    row(LexId::PkeTerm, "PKE_TERM", "PKE Terminal",
        &["ai terminal", "pke terminal", "ai chat window"],
        "system", "Interaction band on the main UI."),
    row(LexId::PkeResp, "PKE_RESP", "PKE Response",
        &["pke response", "ai response"],
        "system", "Block of text returned by the PKE."),
    row(LexId::TplMap, "TPL_MAP", "Template Map",
        &["template map", "layout map", "field map"],
        "system", "Mapping between lexicon ids and template placeholders."),
    row(LexId::ExpEngine, "EXP_ENGINE", "Export Engine",
        &["export engine", "generator", "exporter"],
        "system", "PPTX/DOCX/XLSX generators."),
    row(LexId::SsState, "SS_STATE", "Session State",
        &["session state", "ui state", "state"],
        "system", "Shared state across UI tabs."),
    row(LexId::UiPanel, "UI_PANEL", "UI Panel",
        &["panel", "window", "card"],
        "system", "Logical UI region in the layout."),
    row(LexId::UiConnect, "UI_CONNECT", "UI Connector",
        &["connector", "flow line", "node connection"],
        "system", "Visual connector between panels."),
    row(LexId::TplTitleBlock, "TPL_TITLE_BLOCK", "Template Title Block",
        &["title block", "ppt title", "slide title placeholder"],
        "template", "Placeholder for slide titles."),
    row(LexId::TplSubtitleBlock, "TPL_SUBTITLE_BLOCK", "Template Subtitle Block",
        &["subtitle block", "ppt subtitle"],
        "template", "Placeholder for slide subtitles."),
    row(LexId::TplBody, "TPL_BODY", "Template Body Text",
        &["body block", "content block", "text placeholder"],
        "template", "General body text placeholder."),
    row(LexId::TplBullets, "TPL_BULLETS", "Template Bullet Block",
        &["bullet block", "bullets placeholder"],
        "template", "Bullet text placeholder."),
    row(LexId::TplTable, "TPL_TABLE", "Template Table Block",
        &["table block", "table placeholder"],
        "template", "Tabular placeholder region."),
    row(LexId::TplImage, "TPL_IMAGE", "Template Image Block",
        &["image block", "picture placeholder"],
        "template", "Image placeholder region."),
    row(LexId::TplSlideNo, "TPL_SLIDE_NO", "Template Slide Number",
        &["slide number", "slide no"],
        "template", "Slide number display field."),
    row(LexId::TplFooterLeft, "TPL_FOOTER_LEFT", "Footer Left",
        &["footer left", "left footer"],
        "template", "Left footer text placeholder."),
    row(LexId::TplFooterMid, "TPL_FOOTER_MID", "Footer Centre",
        &["footer middle", "footer centre", "footer center"],
        "template", "Middle footer text placeholder."),
    row(LexId::TplFooterRight, "TPL_FOOTER_RIGHT", "Footer Right",
        &["footer right", "right footer"],
        "template", "Right footer text placeholder."),
    row(LexId::TplHeaderLeft, "TPL_HEADER_LEFT", "Header Left",
        &["header left", "left header"],
        "template", "Left header placeholder."),
    row(LexId::TplHeaderRight, "TPL_HEADER_RIGHT", "Header Right",
        &["header right", "right header"],
        "template", "Right header placeholder."),
];

fn builtin_row(id: LexId) -> &'static BuiltinRow {
    // BUILTIN lists every variant exactly once, in declaration order
    &BUILTIN[id as usize]
}

static BUILTIN_LEXICON: Lazy<Arc<Lexicon>> = Lazy::new(|| Arc::new(builtin_index()));

/// Normalise a human string for lookup
pub fn normalize_key(value: &str) -> String {
    value
        .trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '_' | '-' | ':' | '.') && !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Alias → id lookup over the built-in table plus configured extensions
#[derive(Debug, Clone)]
pub struct Lexicon {
    index: HashMap<String, LexId>,
    extension_count: usize,
}

impl Lexicon {
    /// Process-wide registry containing only the built-in terms
    pub fn builtin() -> Arc<Lexicon> {
        Arc::clone(&BUILTIN_LEXICON)
    }

    /// Resolve a raw term (label, header, legacy key or id token) to its id
    pub fn normalize(&self, raw_term: &str) -> Result<LexId> {
        self.index
            .get(&normalize_key(raw_term))
            .copied()
            .ok_or_else(|| {
                ReferentialError::UnknownTerm {
                    term: raw_term.trim().to_string(),
                }
                .into()
            })
    }

    /// Like [`normalize`](Self::normalize) but `None` on unknown terms
    pub fn try_normalize(&self, raw_term: &str) -> Option<LexId> {
        self.index.get(&normalize_key(raw_term)).copied()
    }

    /// Metadata for an id
    pub fn entry(&self, id: LexId) -> &'static LexiconEntry {
        &builtin_row(id).entry
    }

    /// Metadata for a raw term, `None` if it does not resolve
    pub fn lookup(&self, raw_term: &str) -> Option<&'static LexiconEntry> {
        self.try_normalize(raw_term).map(|id| self.entry(id))
    }

    /// True if `raw_term` resolves to `expected`
    pub fn is_term(&self, raw_term: &str, expected: LexId) -> bool {
        self.try_normalize(raw_term) == Some(expected)
    }

    /// Number of aliases added on top of the built-in table
    pub fn extension_count(&self) -> usize {
        self.extension_count
    }
}

/// Builds a [`Lexicon`]; the result is immutable
#[derive(Debug, Default)]
pub struct LexiconBuilder {
    aliases: Vec<(String, LexId)>,
}

impl LexiconBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an extra alias for an existing id
    pub fn with_alias(mut self, alias: impl Into<String>, id: LexId) -> Self {
        self.aliases.push((alias.into(), id));
        self
    }

    /// Register aliases given as `alias → id token` pairs, e.g. from config
    pub fn with_alias_table<'a, I>(mut self, table: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        for (alias, token) in table {
            let id = token.parse::<LexId>().map_err(|_| {
                Error::Config(format!(
                    "Lexicon alias '{}' targets unknown id '{}'",
                    alias, token
                ))
            })?;
            self.aliases.push((alias.clone(), id));
        }
        Ok(self)
    }

    /// Build the registry, rejecting aliases that would re-point a known term
    pub fn build(self) -> Result<Lexicon> {
        let mut lexicon = builtin_index();
        for (alias, id) in self.aliases {
            let key = normalize_key(&alias);
            if key.is_empty() {
                return Err(Error::Config("Lexicon alias is empty".to_string()));
            }
            match lexicon.index.get(&key) {
                Some(existing) if *existing != id => {
                    return Err(Error::Config(format!(
                        "Lexicon alias '{}' already resolves to {}, cannot map it to {}",
                        alias, existing, id
                    )));
                }
                Some(_) => {}
                None => {
                    lexicon.index.insert(key, id);
                    lexicon.extension_count += 1;
                }
            }
        }
        Ok(lexicon)
    }
}

fn builtin_index() -> Lexicon {
    let mut index = HashMap::new();
    for row in BUILTIN {
        let entry = &row.entry;
        let keys = std::iter::once(entry.primary_term)
            .chain(entry.variants.iter().copied())
            .chain(std::iter::once(row.token));
        for key in keys {
            index.entry(normalize_key(key)).or_insert(row.id);
        }
    }
    Lexicon {
        index,
        extension_count: 0,
    }
}
