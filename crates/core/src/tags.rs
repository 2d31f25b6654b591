//! Keyword tags: short, uppercase, accent-free tokens that name what a tender
//! is about (places, line numbers, acronyms, proper nouns).
//!
//! Tags come from a language model. Its answer is parsed in two stages, a
//! strict JSON list first and an uppercase-token scan of the raw text second,
//! and every candidate then goes through the same deterministic cleaning so
//! that document tags and query tags compare by plain string equality.

use crate::llm::CompletionModel;
use deunicode::deunicode;
use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::LazyLock;
use tracing::{debug, warn};

/// Generic procurement vocabulary that appears in every tender.
const PROCUREMENT_TERMS: &[&str] = &[
    "MARCHE", "MARCHES", "APPEL", "APPELS", "OFFRE", "OFFRES", "DOSSIER", "DOSSIERS",
    "CONSULTATION", "CONSULTATIONS", "CONTRAT", "CONTRATS", "CONVENTION", "CONVENTIONS",
    "ACCORD", "ACCORDS", "PROCEDURE", "PROCEDURES", "CANDIDATURE", "CANDIDATURES", "LOT",
    "LOTS", "TRANCHE", "TRANCHES", "PHASE", "PHASES", "ETAPES", "PRESTATION", "PRESTATIONS",
    "SERVICE", "SERVICES", "TRAVAIL", "TRAVAUX", "CHANTIER", "CHANTIERS", "PROJET", "PROJETS",
    "OPERATION", "OPERATIONS", "REALISATION", "REALISATIONS", "CONSTRUCTION", "CONSTRUCTIONS",
    "REHABILITATION", "REHABILITATIONS", "RENOVATION", "RENOVATIONS", "REPARATION",
    "REPARATIONS", "ENTRETIEN", "MAINTENANCE", "MAINTENANCES", "EXPLOITATION", "EXPLOITATIONS",
    "FOURNITURE", "FOURNITURES", "LIVRAISON", "LIVRAISONS", "AMENAGEMENT", "AMENAGEMENTS",
    "EQUIPEMENT", "EQUIPEMENTS", "INSTALLATION", "INSTALLATIONS", "DEMOLITION", "DEMOLITIONS",
    "DECONSTRUCTION", "DECONSTRUCTIONS", "EXTENSION", "EXTENSIONS", "AGRANDISSEMENT",
    "AGRANDISSEMENTS", "ETUDE", "ETUDES", "CONCEPTION", "CONCEPTIONS", "INGENIERIE", "MAITRISE",
    "ASSISTANCE", "AUDIT", "AUDITS", "EXPERTISE", "EXPERTISES", "DEVELOPPEMENT", "ELABORATION",
    "ELABORATIONS", "PREPARATION", "PREPARATIONS", "COORDINATION", "COORDINATIONS", "GESTION",
    "SUIVI", "SUIVIS", "PLANIFICATION", "ORGANISATION", "EXECUTION", "EXECUTIONS", "PRODUCTION",
    "PRODUCTIONS", "ACTIVITE", "ACTIVITES", "MISSION", "MISSIONS", "OBJET", "OBJETS", "BATIMENT",
    "BATIMENTS", "OUVRAGE", "OUVRAGES", "INFRASTRUCTURE", "INFRASTRUCTURES", "RESEAU", "RESEAUX",
    "SYSTEME", "SYSTEMES", "LOGICIEL", "LOGICIELS", "PLATEFORME", "PLATEFORMES", "MATERIEL",
    "MATERIAUX", "LIGNE", "STATION", "SECTION", "CENTRALE", "STRUCTURE", "VAL", "HMC", "NOM",
];

const FRENCH_FUNCTION_WORDS: &[&str] = &[
    "AI", "AIT", "AINSI", "ALORS", "APRES", "ASSEZ", "AU", "AUCUN", "AUCUNE", "AUJOURDHUI",
    "AUSSI", "AUTANT", "AUTRE", "AUTRES", "AUX", "AVANT", "AVEC", "AVOIR", "BIEN", "BIENTOT",
    "BON", "CAR", "CE", "CELA", "CELLE", "CELLES", "CELUI", "CENT", "CEPENDANT", "CERTAIN",
    "CERTAINE", "CERTAINES", "CERTAINS", "CES", "CEST", "CET", "CETTE", "CEUX", "CHACUN",
    "CHAQUE", "CHEZ", "CI", "COMME", "COMMENT", "DANS", "DE", "DEJA", "DEPUIS", "DERNIER", "DES",
    "DEVOIR", "DIFFERENT", "DIFFERENTE", "DIFFERENTS", "DIRE", "DIVERS", "DIVERSE", "DOIT",
    "DONC", "DONNER", "DONT", "DOS", "DU", "ELLE", "ELLES", "EN", "ENCORE", "ENFIN", "ENSEMBLE",
    "ENSUITE", "ENTRE", "ENVIRON", "EST", "ET", "ETC", "EUX", "FAIRE", "FAIS", "FAIT",
    "FINALEMENT", "FOIS", "FONT", "FUT", "GRACE", "GRAND", "GROS", "GUERE", "HAUT", "HORS",
    "ICI", "IL", "ILS", "JAMAIS", "JE", "JUSQU", "JUSQUA", "JUSTE", "LA", "LAQUELLE", "LARGE",
    "LE", "LENT", "LEQUEL", "LES", "LESQUELS", "LEUR", "LEURS", "LONG", "LUI", "MA", "MAIS",
    "MALGRE", "ME", "MEILLEUR", "MEM", "MEME", "MEMES", "MES", "MOI", "MOINS", "MON", "NE", "NI",
    "NON", "NOS", "NOTRE", "NOUS", "NOUVEAU", "ANCIEN", "ON", "ONT", "OR", "OU", "PAR", "PARCE",
    "PAS", "PENDANT", "PETIT", "PEU", "PEUT", "PIRE", "PLUS", "PLUSIEURS", "POUR", "POURQUOI",
    "POUVOIR", "PREMIER", "PRENDRE", "PROPRE", "PUIS", "QUAND", "QUE", "QUEL", "QUELLE",
    "QUELLES", "QUELQUE", "QUELQUES", "QUELS", "QUI", "QUOI", "RAPIDE", "SA", "SANS", "SAVOIR",
    "SE", "SEUL", "SEULEMENT", "SERA", "SES", "SI", "SIMPLEMENT", "SINON", "SOI", "SOIT", "SON",
    "SONT", "SOUDAIN", "SOUS", "SUR", "TA", "TARD", "TE", "TEL", "TELLE", "TELLES", "TELS",
    "TES", "TOI", "TON", "TOT", "TOUJOURS", "TOUS", "TOUT", "TOUTE", "TOUTES", "TRES", "TROP",
    "TU", "UN", "UNE", "UNES", "UNIQUEMENT", "UNS", "VARIE", "VARIEE", "VARIES", "VASTE", "VITE",
    "VOICI", "VOILA", "VOIR", "VOS", "VOTRE", "VOULOIR", "VOUS",
];

/// Words models tend to add around their answer.
const ENGLISH_FILLER: &[&str] = &[
    "ALL", "APPEARS", "AS", "BE", "COMBINED", "EXTRACTED", "FINAL", "FORM", "HAVE", "JSON",
    "NAME", "NOTE", "PHRASES", "PROJECT", "REDUNDANT", "RELEVANT", "REPEATED", "RESPONSE",
    "SEEMS", "SIMPLY", "THEM", "TO", "HERE", "ARE", "THE", "TAGS", "AND", "OF",
];

const SINGLE_LETTERS: &[&str] = &[
    "A", "B", "C", "D", "F", "G", "H", "J", "K", "L", "M", "N", "P", "Q", "R", "S", "T", "V",
    "W", "X", "Z",
];

static TAG_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-ZÀ-ÖØ-Ý][A-ZÀ-ÖØ-Ý0-9\-]+")
        .expect("unreachable error: tag token pattern is valid")
});

static NON_TAG_CHARS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[^A-Z0-9]+").expect("unreachable error: tag separator pattern is valid")
});

/// Uppercase, fold accents to ASCII, turn anything that is not a letter or
/// digit into a single space and trim.
pub fn normalize_tag(tag: &str) -> String {
    let folded = deunicode(tag).to_uppercase();
    NON_TAG_CHARS.replace_all(&folded, " ").trim().to_string()
}

#[derive(Debug, Clone)]
pub struct StopwordSet {
    words: HashSet<String>,
}

impl Default for StopwordSet {
    fn default() -> Self {
        Self::from_words(
            PROCUREMENT_TERMS
                .iter()
                .chain(FRENCH_FUNCTION_WORDS)
                .chain(ENGLISH_FILLER)
                .chain(SINGLE_LETTERS)
                .copied(),
        )
    }
}

impl StopwordSet {
    pub fn from_words<'a>(words: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            words: words
                .into_iter()
                .map(normalize_tag)
                .filter(|word| !word.is_empty())
                .collect(),
        }
    }

    pub fn extend<'a>(&mut self, words: impl IntoIterator<Item = &'a str>) {
        self.words.extend(words.into_iter().map(normalize_tag));
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.words.contains(tag)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

/// Where the text being tagged comes from. Query tags must be longer than
/// document tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagScope {
    Document,
    Query,
}

impl TagScope {
    pub fn min_len(self) -> usize {
        match self {
            TagScope::Document => 2,
            TagScope::Query => 3,
        }
    }
}

/// Candidate tokens read from a model answer, labelled by the stage that
/// produced them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagParse {
    Structured(Vec<String>),
    Heuristic(Vec<String>),
}

impl TagParse {
    pub fn candidates(&self) -> &[String] {
        match self {
            TagParse::Structured(items) | TagParse::Heuristic(items) => items,
        }
    }

    pub fn is_structured(&self) -> bool {
        matches!(self, TagParse::Structured(_))
    }
}

pub fn parse_tag_response(raw: &str) -> TagParse {
    match parse_json_list(raw) {
        Some(items) => TagParse::Structured(items),
        None => TagParse::Heuristic(uppercase_tokens(raw)),
    }
}

fn parse_json_list(raw: &str) -> Option<Vec<String>> {
    let body = strip_code_fence(raw.trim());
    let items: Vec<Value> = serde_json::from_str(body).ok()?;
    Some(
        items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(text) => Some(text),
                Value::Number(number) => Some(number.to_string()),
                _ => None,
            })
            .collect(),
    )
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Runs of two or more uppercase letters, digits or hyphens that start with
/// a letter, read from the uppercased text.
fn uppercase_tokens(raw: &str) -> Vec<String> {
    TAG_TOKEN
        .find_iter(&raw.to_uppercase())
        .map(|token| token.as_str().to_string())
        .collect()
}

fn is_separator(c: char) -> bool {
    matches!(c, '\'' | '’' | '‘' | 'ʼ' | '`' | '-' | '‐' | '–' | '_')
}

/// Split glued terms, normalize, drop short words and stopwords, dedupe in
/// first-seen order.
pub fn clean_candidates(candidates: &[String], scope: TagScope, stopwords: &StopwordSet) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut tags = Vec::new();

    for candidate in candidates {
        let separated: String = candidate
            .chars()
            .map(|c| if is_separator(c) { ' ' } else { c })
            .collect();

        for part in separated.split_whitespace() {
            let normalized = normalize_tag(part);
            for token in normalized.split(' ') {
                if token.len() < scope.min_len() || stopwords.contains(token) {
                    continue;
                }
                if seen.insert(token.to_string()) {
                    tags.push(token.to_string());
                }
            }
        }
    }

    tags
}

pub fn document_prompt(snippet: &str) -> String {
    format!(
        "You extract the name of the technical tender or project described in a document.\n\
         Strict rules:\n\
         1. Never comment on your answer.\n\
         2. Return ONLY the name of the main tender or project found in the text below.\n\
         3. Drop common words; keep place names, proper nouns, acronyms and numbers.\n\
         4. Answer ONLY with the words of the name, in UPPERCASE, separated by spaces.\n\n\
         Text:\n{snippet}\n"
    )
}

pub fn query_prompt(query: &str) -> String {
    format!(
        "You extract tags from a user question about tender documents.\n\
         Return ONLY the discriminating terms (rare words, place names, line numbers, \
         identifiers, acronyms).\n\
         Answer with a JSON list of UPPERCASE strings and nothing else. Never include the word \
         \"JSON\" in the list.\n\n\
         Question: {query}\n"
    )
}

/// Asks a [`CompletionModel`] for tags and cleans its answer. Never fails:
/// a model error yields an empty tag list, which callers read as "no tag
/// signal".
#[derive(Debug, Clone)]
pub struct TagExtractor<M> {
    model: M,
    stopwords: StopwordSet,
}

impl<M> TagExtractor<M>
where
    M: CompletionModel,
{
    pub fn new(model: M) -> Self {
        Self {
            model,
            stopwords: StopwordSet::default(),
        }
    }

    pub fn with_stopwords(mut self, stopwords: StopwordSet) -> Self {
        self.stopwords = stopwords;
        self
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn stopwords(&self) -> &StopwordSet {
        &self.stopwords
    }

    pub async fn document_tags(&self, snippet: &str) -> Vec<String> {
        self.extract(&document_prompt(snippet), TagScope::Document).await
    }

    pub async fn query_tags(&self, query: &str) -> Vec<String> {
        self.extract(&query_prompt(query), TagScope::Query).await
    }

    async fn extract(&self, prompt: &str, scope: TagScope) -> Vec<String> {
        let raw = match self.model.complete(prompt).await {
            Ok(raw) => raw,
            Err(error) => {
                warn!(%error, ?scope, "tag extraction failed, continuing without tags");
                return Vec::new();
            }
        };

        let parsed = parse_tag_response(&raw);
        let tags = clean_candidates(parsed.candidates(), scope, &self.stopwords);
        debug!(
            raw = %raw,
            structured = parsed.is_structured(),
            ?tags,
            "tags extracted"
        );
        tags
    }
}
