//! Archive catalog: phases, the sections (facilities) inside them, and the
//! evidence files each section holds.
//!
//! The catalog is immutable once built. It arrives from the content panel as
//! JSON in the panel's flat record layout (`title_ko` / `title_en`, `labs`,
//! ...) and is converted into the typed model below. A built-in three-phase
//! catalog ships with the crate and is used whenever no stored catalog is
//! present or the stored one fails to parse.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::corruption::CorruptionLevel;
use crate::error::CatalogError;
use crate::progress_store::KvStore;

/// Store key under which the content panel keeps the phase catalog.
pub const CATALOG_KEY: &str = "phases_data";

const BUILTIN_CATALOG_JSON: &str = include_str!("../assets/default_catalog.json");

// =============================================================================
// Language + bilingual text
// =============================================================================

/// Display language tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    #[default]
    Ko,
    En,
}

impl fmt::Display for Lang {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ko => write!(f, "ko"),
            Self::En => write!(f, "en"),
        }
    }
}

impl FromStr for Lang {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ko" | "kr" | "korean" => Ok(Self::Ko),
            "en" | "english" => Ok(Self::En),
            _ => Err(format!("unknown language: {s}. Expected one of: ko, en")),
        }
    }
}

/// A Korean/English text pair.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Bilingual {
    pub ko: String,
    pub en: String,
}

impl Bilingual {
    #[must_use]
    pub fn new(ko: impl Into<String>, en: impl Into<String>) -> Self {
        Self {
            ko: ko.into(),
            en: en.into(),
        }
    }

    /// Select the text for `lang`.
    #[must_use]
    pub fn pick(&self, lang: Lang) -> &str {
        match lang {
            Lang::Ko => &self.ko,
            Lang::En => &self.en,
        }
    }
}

// =============================================================================
// Typed model
// =============================================================================

/// An evidence file inside a section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceFile {
    pub id: String,
    pub title: Bilingual,
    pub url: String,
    pub images: Vec<String>,
}

/// How a section presents its evidence files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GalleryMode {
    /// Files are listed individually and opened one at a time.
    #[default]
    Never,
    /// All file images are flattened into a single gallery.
    Always,
    /// Gallery only once the archive reaches [`CorruptionLevel::Severe`].
    WhenSevere,
}

/// A facility within a phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub id: String,
    pub name: Bilingual,
    pub director: Bilingual,
    pub intro: Bilingual,
    pub detail: Bilingual,
    pub files: Vec<EvidenceFile>,
    pub gallery: GalleryMode,
}

impl Section {
    /// Whether the section shows its files as one flattened image gallery at
    /// the given corruption level.
    #[must_use]
    pub fn renders_as_gallery(&self, level: CorruptionLevel) -> bool {
        match self.gallery {
            GalleryMode::Never => false,
            GalleryMode::Always => true,
            GalleryMode::WhenSevere => level == CorruptionLevel::Severe,
        }
    }

    /// Every image of every file, in file order.
    pub fn gallery_images(&self) -> impl Iterator<Item = &str> {
        self.files
            .iter()
            .flat_map(|file| file.images.iter().map(String::as_str))
    }

    #[must_use]
    pub fn file(&self, id: &str) -> Option<&EvidenceFile> {
        self.files.iter().find(|file| file.id == id)
    }

    #[must_use]
    pub fn contains_image(&self, url: &str) -> bool {
        self.gallery_images().any(|image| image == url)
    }
}

/// One sequential unit of gated content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phase {
    pub id: String,
    /// Display label, e.g. `D+00 ~ D+30`.
    pub range: String,
    pub title: Bilingual,
    pub description: Bilingual,
    pub sections: Vec<Section>,
}

impl Phase {
    pub fn section_ids(&self) -> impl Iterator<Item = &str> {
        self.sections.iter().map(|section| section.id.as_str())
    }
}

/// Validated, ordered list of phases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Catalog {
    phases: Vec<Phase>,
}

impl Catalog {
    /// Build a catalog, validating ids and shape.
    pub fn new(phases: Vec<Phase>) -> Result<Self, CatalogError> {
        if phases.is_empty() {
            return Err(CatalogError::Empty);
        }

        let mut phase_ids = HashSet::new();
        let mut section_ids = HashSet::new();
        for phase in &phases {
            if !phase_ids.insert(phase.id.as_str()) {
                return Err(CatalogError::DuplicatePhase(phase.id.clone()));
            }
            if phase.sections.is_empty() {
                return Err(CatalogError::EmptyPhase(phase.id.clone()));
            }
            for section in &phase.sections {
                if !section_ids.insert(section.id.as_str()) {
                    return Err(CatalogError::DuplicateSection(section.id.clone()));
                }
            }
        }

        Ok(Self { phases })
    }

    /// The catalog shipped with the crate.
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_records_json(BUILTIN_CATALOG_JSON)
    }

    /// Parse the content panel's JSON record layout.
    pub fn from_records_json(json: &str) -> Result<Self, CatalogError> {
        let records: Vec<PhaseRecord> = serde_json::from_str(json)?;
        Self::new(records.into_iter().map(Phase::from).collect())
    }

    /// Render the catalog back into the content panel's record layout.
    pub fn to_records_json(&self) -> Result<String, serde_json::Error> {
        let records: Vec<PhaseRecord> = self.phases.iter().map(PhaseRecord::from).collect();
        serde_json::to_string_pretty(&records)
    }

    /// Load the stored catalog, falling back to the built-in one when the key
    /// is absent, unreadable or malformed.
    pub fn load_or_builtin<K: KvStore + ?Sized>(store: &K) -> Result<Self, CatalogError> {
        match store.get(CATALOG_KEY) {
            Ok(Some(json)) => match Self::from_records_json(&json) {
                Ok(catalog) => {
                    debug!(phases = catalog.len(), "Loaded stored catalog");
                    return Ok(catalog);
                }
                Err(err) => {
                    warn!(error = %err, "Stored catalog rejected, using built-in catalog");
                }
            },
            Ok(None) => {}
            Err(err) => {
                warn!(error = %err, "Catalog store unreadable, using built-in catalog");
            }
        }
        Self::builtin()
    }

    #[must_use]
    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    #[must_use]
    pub fn phase(&self, index: usize) -> Option<&Phase> {
        self.phases.get(index)
    }

    /// Ordinal index of the phase with `id`.
    #[must_use]
    pub fn position(&self, id: &str) -> Option<usize> {
        self.phases.iter().position(|phase| phase.id == id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.phases.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    /// Phase count as the unlock counter's type.
    #[must_use]
    pub fn phase_count(&self) -> u32 {
        u32::try_from(self.phases.len()).unwrap_or(u32::MAX)
    }
}

// =============================================================================
// Content panel record layout
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FileRecord {
    id: String,
    title_ko: String,
    title_en: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    images: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LabRecord {
    id: String,
    name_ko: String,
    name_en: String,
    #[serde(default)]
    director_ko: String,
    #[serde(default)]
    director_en: String,
    #[serde(default)]
    intro_ko: String,
    #[serde(default)]
    intro_en: String,
    #[serde(default)]
    detail_ko: String,
    #[serde(default)]
    detail_en: String,
    #[serde(default)]
    files: Vec<FileRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    gallery: Option<GalleryMode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PhaseRecord {
    id: String,
    range: String,
    title_ko: String,
    title_en: String,
    #[serde(default)]
    desc_ko: String,
    #[serde(default)]
    desc_en: String,
    labs: Vec<LabRecord>,
}

/// Records written before the panel grew a `gallery` field identify gallery
/// facilities by their Korean name.
fn infer_gallery_mode(name_ko: &str) -> GalleryMode {
    match name_ko {
        "샘플 카탈로그실" | "조합 실험실" => GalleryMode::Always,
        "분석 기록실" => GalleryMode::WhenSevere,
        _ => GalleryMode::Never,
    }
}

impl From<FileRecord> for EvidenceFile {
    fn from(record: FileRecord) -> Self {
        Self {
            id: record.id,
            title: Bilingual::new(record.title_ko, record.title_en),
            url: record.url,
            images: record.images,
        }
    }
}

impl From<LabRecord> for Section {
    fn from(record: LabRecord) -> Self {
        let gallery = record
            .gallery
            .unwrap_or_else(|| infer_gallery_mode(&record.name_ko));
        Self {
            id: record.id,
            name: Bilingual::new(record.name_ko, record.name_en),
            director: Bilingual::new(record.director_ko, record.director_en),
            intro: Bilingual::new(record.intro_ko, record.intro_en),
            detail: Bilingual::new(record.detail_ko, record.detail_en),
            files: record.files.into_iter().map(EvidenceFile::from).collect(),
            gallery,
        }
    }
}

impl From<PhaseRecord> for Phase {
    fn from(record: PhaseRecord) -> Self {
        Self {
            id: record.id,
            range: record.range,
            title: Bilingual::new(record.title_ko, record.title_en),
            description: Bilingual::new(record.desc_ko, record.desc_en),
            sections: record.labs.into_iter().map(Section::from).collect(),
        }
    }
}

impl From<&EvidenceFile> for FileRecord {
    fn from(file: &EvidenceFile) -> Self {
        Self {
            id: file.id.clone(),
            title_ko: file.title.ko.clone(),
            title_en: file.title.en.clone(),
            url: file.url.clone(),
            images: file.images.clone(),
        }
    }
}

impl From<&Section> for LabRecord {
    fn from(section: &Section) -> Self {
        Self {
            id: section.id.clone(),
            name_ko: section.name.ko.clone(),
            name_en: section.name.en.clone(),
            director_ko: section.director.ko.clone(),
            director_en: section.director.en.clone(),
            intro_ko: section.intro.ko.clone(),
            intro_en: section.intro.en.clone(),
            detail_ko: section.detail.ko.clone(),
            detail_en: section.detail.en.clone(),
            files: section.files.iter().map(FileRecord::from).collect(),
            gallery: Some(section.gallery),
        }
    }
}

impl From<&Phase> for PhaseRecord {
    fn from(phase: &Phase) -> Self {
        Self {
            id: phase.id.clone(),
            range: phase.range.clone(),
            title_ko: phase.title.ko.clone(),
            title_en: phase.title.en.clone(),
            desc_ko: phase.description.ko.clone(),
            desc_en: phase.description.en.clone(),
            labs: phase.sections.iter().map(LabRecord::from).collect(),
        }
    }
}
