use std::io::{self, Write};

use serde::Serialize;

use crate::preprocess::PreprocessOption;
use crate::profiles::Profile;
use crate::semantic::Neighbor;

const BANNER_WIDTH: usize = 70;
const SEPARATOR_WIDTH: usize = 50;

/// One profile in a result list.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProfileHit {
    pub rank: usize,
    pub distance: f32,
    pub name: String,
    pub country: String,
    pub full_name: Option<String>,
    pub bio: Option<String>,
    pub follows: Option<u64>,
    pub following: Option<u64>,
    pub tags: Vec<String>,
}

/// Everything printed for one (query, option, model) search.
#[derive(Debug, Clone, Serialize)]
pub struct QueryReport {
    pub query: String,
    pub normalized_query: String,
    pub model_name: String,
    pub option: PreprocessOption,
    pub hits: Vec<ProfileHit>,
}

impl QueryReport {
    pub fn new(
        query: &str,
        normalized_query: &str,
        model_name: &str,
        option: PreprocessOption,
        neighbors: &[Neighbor],
        profiles: &[Profile],
    ) -> Self {
        let hits = neighbors
            .iter()
            .enumerate()
            .filter_map(|(rank, neighbor)| {
                let Some(profile) = profiles.get(neighbor.id) else {
                    log::warn!("neighbor id {} is outside the dataset", neighbor.id);
                    return None;
                };
                let social = profile.instagram.clone().unwrap_or_default();
                Some(ProfileHit {
                    rank: rank + 1,
                    distance: neighbor.distance,
                    name: profile.name.clone(),
                    country: profile.state.clone(),
                    full_name: social.full_name,
                    bio: social.bio,
                    follows: social.follows,
                    following: social.following,
                    tags: profile.tags.clone(),
                })
            })
            .collect();

        Self {
            query: query.to_string(),
            normalized_query: normalized_query.to_string(),
            model_name: model_name.to_string(),
            option,
            hits,
        }
    }

    pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let banner = "-".repeat(BANNER_WIDTH);
        let separator = "-".repeat(SEPARATOR_WIDTH);

        writeln!(out, "{banner}")?;
        writeln!(out, "{banner}")?;
        writeln!(out, "Query: {}", self.query)?;
        if self.normalized_query != self.query {
            writeln!(out, "Normalized: {}", self.normalized_query)?;
        }
        writeln!(out, "Model: {}", self.model_name)?;
        writeln!(out, "Option: {} ({})", self.option, self.option.describe())?;

        for hit in &self.hits {
            let json = serde_json::to_string_pretty(hit).map_err(io::Error::from)?;
            writeln!(out, "{json}")?;
            writeln!(out, "{separator}")?;
        }

        writeln!(out, "{banner}")?;
        writeln!(out, "{banner}")?;
        Ok(())
    }
}
