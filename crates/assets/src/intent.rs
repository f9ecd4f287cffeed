//! Keyword classification of asset prompts.
//!
//! The router, not the model, decides which integration serves a prompt.
//! Classification is a deterministic keyword heuristic so the choice is
//! reproducible and testable.

/// An upstream asset integration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetProvider {
    /// Generative 3D (Hyper3D Rodin): unique, made-to-order items.
    Hyper3d,
    /// Curated catalogue (Sketchfab): existing downloadable models.
    Sketchfab,
    /// Free libraries (Poly Haven): textures, HDRIs, stock models.
    PolyHaven,
}

impl AssetProvider {
    pub fn name(&self) -> &'static str {
        match self {
            AssetProvider::Hyper3d => "hyper3d",
            AssetProvider::Sketchfab => "sketchfab",
            AssetProvider::PolyHaven => "polyhaven",
        }
    }
}

/// What kind of asset the prompt is after.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Model,
    Texture,
    Hdri,
}

impl AssetKind {
    pub fn name(&self) -> &'static str {
        match self {
            AssetKind::Model => "model",
            AssetKind::Texture => "texture",
            AssetKind::Hdri => "hdri",
        }
    }
}

/// A classified asset request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetIntent {
    pub provider: AssetProvider,
    pub kind: AssetKind,
    /// Stop-word-filtered search terms extracted from the prompt.
    pub keywords: Vec<String>,
}

const GENERATION_WORDS: &[&str] = &[
    "generate",
    "generated",
    "generation",
    "photorealistic",
    "hyper3d",
    "rodin",
    "ai-generated",
    "custom-made",
];

const LIBRARY_WORDS: &[&str] = &[
    "hdri",
    "hdr",
    "environment",
    "skybox",
    "texture",
    "textures",
    "material",
    "materials",
    "polyhaven",
];

const CATALOGUE_WORDS: &[&str] = &[
    "import",
    "download",
    "model",
    "asset",
    "sketchfab",
    "find",
];

const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "of", "for", "with", "and", "or", "to", "in", "on", "at", "me", "my", "us",
    "please", "some", "that", "this", "it", "is", "are", "i", "we", "you", "want", "need", "like",
    "would", "could", "can", "add", "get", "give", "put", "make", "import", "download", "find",
    "search", "scene", "into", "from",
];

/// How many keywords survive extraction.
const MAX_KEYWORDS: usize = 5;

/// Classify a prompt into an asset intent, or `None` when it does not look
/// like an asset request at all.
pub fn classify(prompt: &str) -> Option<AssetIntent> {
    let words = tokenize(prompt);
    if words.is_empty() {
        return None;
    }

    let has = |set: &[&str]| words.iter().any(|w| set.contains(&w.as_str()));

    // Precedence: generation beats library beats catalogue, so "generate a
    // wood texture" still goes to the generative provider.
    let provider = if has(GENERATION_WORDS) {
        AssetProvider::Hyper3d
    } else if has(LIBRARY_WORDS) {
        AssetProvider::PolyHaven
    } else if has(CATALOGUE_WORDS) {
        AssetProvider::Sketchfab
    } else {
        return None;
    };

    let kind = if words.iter().any(|w| w == "hdri" || w == "hdr" || w == "skybox") {
        AssetKind::Hdri
    } else if words
        .iter()
        .any(|w| w == "texture" || w == "textures" || w == "material" || w == "materials")
    {
        AssetKind::Texture
    } else {
        AssetKind::Model
    };

    Some(AssetIntent {
        provider,
        kind,
        keywords: extract_keywords(&words),
    })
}

fn tokenize(prompt: &str) -> Vec<String> {
    prompt
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '-')
        .filter(|w| !w.is_empty())
        .map(String::from)
        .collect()
}

/// Keep content words: drop stop words, routing vocabulary, and bare
/// numbers.
fn extract_keywords(words: &[String]) -> Vec<String> {
    words
        .iter()
        .filter(|w| !STOP_WORDS.contains(&w.as_str()))
        .filter(|w| !GENERATION_WORDS.contains(&w.as_str()))
        .filter(|w| !w.chars().all(|c| c.is_ascii_digit()))
        .take(MAX_KEYWORDS)
        .cloned()
        .collect()
}
