//! Overpass API support
//!
//! Query construction from XML templates and a cached interpreter client.

pub mod client;
pub mod query;

pub use client::{default_cache_key, OverpassClient, OverpassError, DEFAULT_ENDPOINT, DEFAULT_QUERY_MAX_AGE_DAYS};
pub use query::{
    area_id, build_xml_query, fill_template, AreaMode, BoundingBox, QueryError, QueryFragments, SearchArea,
    AREA_ID_OFFSET, DEFAULT_BOUNDING_BOX, DEFAULT_RELATION_ID,
};
