//! Overpass XML query construction
//!
//! Fills a user-supplied template with three named fragments:
//! `{variables_query}`, `{area_query}` and `{recurse}`.

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use tracing::debug;

/// Offset Overpass adds to a relation id to address the area derived from it
pub const AREA_ID_OFFSET: u64 = 3_600_000_000;

/// Legal Norway, including territorial waters
pub const DEFAULT_RELATION_ID: u64 = 2_978_650;

/// Rough box around Norway
pub const DEFAULT_BOUNDING_BOX: BoundingBox = BoundingBox {
    west: 3.33984375,
    south: 57.468589192089325,
    east: 38.408203125,
    north: 81.1203884020757,
};

const RECURSE_FRAGMENT: &str = r#"<!-- <recurse from="_" into="_" type="down"/> -->
        <!-- <print e="" from="_" geometry="skeleton" limit="" mode="meta" n="" order="quadtile" s="" w=""/> -->"#;

/// Errors from building a query
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Query template not found: {0}")]
    TemplateNotFound(String),

    #[error("Failed to read query template {path}: {source}")]
    TemplateRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed query template: {0}")]
    MalformedTemplate(String),
}

/// Geographic box in degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl BoundingBox {
    /// Build from `[west, south, east, north]`
    pub fn from_array([west, south, east, north]: [f64; 4]) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }
}

/// Which of the two area restrictions to use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AreaMode {
    BoundingBox,
    Relation,
}

impl FromStr for AreaMode {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bounding_box" => Ok(AreaMode::BoundingBox),
            "relation" => Ok(AreaMode::Relation),
            other => Err(QueryError::InvalidArgument(format!(
                "unknown use = \"{}\", expected \"bounding_box\" or \"relation\"",
                other
            ))),
        }
    }
}

impl fmt::Display for AreaMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AreaMode::BoundingBox => f.write_str("bounding_box"),
            AreaMode::Relation => f.write_str("relation"),
        }
    }
}

/// Area the query is restricted to
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SearchArea {
    BoundingBox(BoundingBox),
    /// OSM relation id, e.g. a country or municipality boundary
    Relation(u64),
}

impl SearchArea {
    /// Pick the area for a `use` mode string
    ///
    /// Only the geometry matching `mode` is used.
    pub fn from_mode(mode: &str, bounding_box: BoundingBox, relation_id: u64) -> Result<Self, QueryError> {
        Ok(match mode.parse::<AreaMode>()? {
            AreaMode::BoundingBox => SearchArea::BoundingBox(bounding_box),
            AreaMode::Relation => SearchArea::Relation(relation_id),
        })
    }
}

impl Default for SearchArea {
    fn default() -> Self {
        SearchArea::Relation(DEFAULT_RELATION_ID)
    }
}

/// The three fragments substituted into a template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryFragments {
    pub variables_query: String,
    pub area_query: String,
    pub recurse: String,
}

/// Overpass area id for the area derived from `relation_id`
pub fn area_id(relation_id: u64) -> Result<u64, QueryError> {
    relation_id.checked_add(AREA_ID_OFFSET).ok_or_else(|| {
        QueryError::InvalidArgument(format!("relation id {} is out of range", relation_id))
    })
}

impl QueryFragments {
    pub fn new(area: &SearchArea, recurse: bool) -> Result<Self, QueryError> {
        let (variables_query, area_query) = match area {
            SearchArea::BoundingBox(bbox) => (
                String::new(),
                format!(
                    r#"<bbox-query into="_" w="{}" s="{}" e="{}" n="{}" />"#,
                    bbox.west, bbox.south, bbox.east, bbox.north
                ),
            ),
            SearchArea::Relation(relation_id) => (
                format!(
                    r#"<id-query into="searchArea" ref="{}" type="area"/>"#,
                    area_id(*relation_id)?
                ),
                r#"<area-query from="searchArea" into="_" ref=""/>"#.to_string(),
            ),
        };

        let recurse = if recurse {
            RECURSE_FRAGMENT.to_string()
        } else {
            String::new()
        };

        Ok(Self {
            variables_query,
            area_query,
            recurse,
        })
    }

    fn get(&self, name: &str) -> Option<&str> {
        match name {
            "variables_query" => Some(&self.variables_query),
            "area_query" => Some(&self.area_query),
            "recurse" => Some(&self.recurse),
            _ => None,
        }
    }
}

/// Read `template_path` and fill it for `area`
pub fn build_xml_query(template_path: &Path, area: &SearchArea, recurse: bool) -> Result<String, QueryError> {
    let template = fs::read_to_string(template_path).map_err(|e| {
        let path = template_path.display().to_string();
        if e.kind() == std::io::ErrorKind::NotFound {
            QueryError::TemplateNotFound(path)
        } else {
            QueryError::TemplateRead { path, source: e }
        }
    })?;

    let query = fill_template(&template, &QueryFragments::new(area, recurse)?)?;
    debug!(query = %query, "XML query");
    Ok(query)
}

/// Substitute named `{placeholder}`s in `template`
///
/// `{{` and `}}` produce literal braces. Unknown placeholders and unbalanced
/// braces are errors.
pub fn fill_template(template: &str, fragments: &QueryFragments) -> Result<String, QueryError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        match c {
            '{' if chars.peek().map(|&(_, next)| next) == Some('{') => {
                chars.next();
                out.push('{');
            }
            '{' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some((_, '}')) => break,
                        Some((_, ch)) if ch != '{' => name.push(ch),
                        _ => {
                            return Err(QueryError::MalformedTemplate(format!(
                                "unclosed '{{' at byte {}",
                                pos
                            )))
                        }
                    }
                }
                let value = fragments.get(&name).ok_or_else(|| {
                    QueryError::MalformedTemplate(format!("unknown placeholder {{{}}}", name))
                })?;
                out.push_str(value);
            }
            '}' if chars.peek().map(|&(_, next)| next) == Some('}') => {
                chars.next();
                out.push('}');
            }
            '}' => {
                return Err(QueryError::MalformedTemplate(format!(
                    "single '}}' at byte {}",
                    pos
                )))
            }
            other => out.push(other),
        }
    }

    Ok(out)
}
