use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::{
    attainment_percentage, meets_target, weighted_attainment, MappingStrength,
    WeightedContribution,
};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutcomeScores {
    pub outcome_id: String,
    /// One percentage per evaluated student.
    pub scores_pct: Vec<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CloPloLink {
    pub clo_id: String,
    pub plo_id: String,
    #[serde(default)]
    pub strength: MappingStrength,
    #[serde(default = "default_weight")]
    pub weight: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PloPeoLink {
    pub plo_id: String,
    pub peo_id: String,
    #[serde(default)]
    pub strength: MappingStrength,
    #[serde(default = "default_weight")]
    pub weight: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RollupInput {
    #[serde(default)]
    pub clo_scores: Vec<OutcomeScores>,
    #[serde(default)]
    pub clo_plo: Vec<CloPloLink>,
    #[serde(default)]
    pub plo_peo: Vec<PloPeoLink>,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttainmentTargets {
    pub passing_threshold_pct: f64,
    pub clo_target_pct: f64,
    pub plo_target_pct: f64,
    pub peo_target_pct: f64,
}

impl Default for AttainmentTargets {
    fn default() -> Self {
        Self {
            passing_threshold_pct: 60.0,
            clo_target_pct: 70.0,
            plo_target_pct: 70.0,
            peo_target_pct: 70.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutcomeAttainment {
    pub outcome_id: String,
    pub attainment_pct: f64,
    pub target_pct: f64,
    pub met: bool,
    /// Students for a CLO, mapped child outcomes for a PLO or PEO.
    pub contributors: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AttainmentReport {
    pub clos: Vec<OutcomeAttainment>,
    pub plos: Vec<OutcomeAttainment>,
    pub peos: Vec<OutcomeAttainment>,
}

impl AttainmentReport {
    pub fn find_plo(&self, plo_id: &str) -> Option<&OutcomeAttainment> {
        self.plos.iter().find(|plo| plo.outcome_id == plo_id)
    }

    pub fn find_peo(&self, peo_id: &str) -> Option<&OutcomeAttainment> {
        self.peos.iter().find(|peo| peo.outcome_id == peo_id)
    }
}

/// CLO -> PLO -> PEO aggregation. Outcomes are reported in id order; an
/// outcome referenced only by a mapping, with nothing feeding it, reports 0.
pub fn rollup(input: &RollupInput, targets: &AttainmentTargets) -> AttainmentReport {
    let mut clo_scores: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for entry in &input.clo_scores {
        clo_scores
            .entry(entry.outcome_id.as_str())
            .or_default()
            .extend(entry.scores_pct.iter().copied());
    }
    for link in &input.clo_plo {
        clo_scores.entry(link.clo_id.as_str()).or_default();
    }

    let clos: Vec<OutcomeAttainment> = clo_scores
        .iter()
        .map(|(clo_id, scores)| {
            outcome(
                clo_id,
                attainment_percentage(scores, targets.passing_threshold_pct),
                targets.clo_target_pct,
                scores.len(),
            )
        })
        .collect();
    let clo_lookup: BTreeMap<&str, f64> =
        clos.iter().map(|clo| (clo.outcome_id.as_str(), clo.attainment_pct)).collect();

    let plo_ids: BTreeSet<&str> = input
        .clo_plo
        .iter()
        .map(|link| link.plo_id.as_str())
        .chain(input.plo_peo.iter().map(|link| link.plo_id.as_str()))
        .collect();
    let plos: Vec<OutcomeAttainment> = plo_ids
        .into_iter()
        .map(|plo_id| {
            let contributions: Vec<WeightedContribution> = input
                .clo_plo
                .iter()
                .filter(|link| link.plo_id == plo_id)
                .map(|link| WeightedContribution {
                    attainment_pct: clo_lookup.get(link.clo_id.as_str()).copied().unwrap_or(0.0),
                    strength: link.strength,
                    weight: link.weight,
                })
                .collect();
            outcome(
                plo_id,
                weighted_attainment(&contributions),
                targets.plo_target_pct,
                contributions.len(),
            )
        })
        .collect();
    let plo_lookup: BTreeMap<&str, f64> =
        plos.iter().map(|plo| (plo.outcome_id.as_str(), plo.attainment_pct)).collect();

    let peo_ids: BTreeSet<&str> = input.plo_peo.iter().map(|link| link.peo_id.as_str()).collect();
    let peos: Vec<OutcomeAttainment> = peo_ids
        .into_iter()
        .map(|peo_id| {
            let contributions: Vec<WeightedContribution> = input
                .plo_peo
                .iter()
                .filter(|link| link.peo_id == peo_id)
                .map(|link| WeightedContribution {
                    attainment_pct: plo_lookup.get(link.plo_id.as_str()).copied().unwrap_or(0.0),
                    strength: link.strength,
                    weight: link.weight,
                })
                .collect();
            outcome(
                peo_id,
                weighted_attainment(&contributions),
                targets.peo_target_pct,
                contributions.len(),
            )
        })
        .collect();

    AttainmentReport { clos, plos, peos }
}

fn outcome(id: &str, attainment_pct: f64, target_pct: f64, contributors: usize) -> OutcomeAttainment {
    OutcomeAttainment {
        outcome_id: id.to_owned(),
        attainment_pct,
        target_pct,
        met: meets_target(attainment_pct, target_pct),
        contributors,
    }
}

fn default_weight() -> f64 {
    1.0
}
