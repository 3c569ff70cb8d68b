//! Stage identities and the fixed execution order of both chains.

use std::fmt;
use std::str::FromStr;

use crate::domain::Phase;

use super::FilterStage;
use super::{
    air_region, circular_mask, clip, crop, cut_off, flat_dark, gaussian, median, minus_log, outliers,
    rebin, ring, rotate, stripe, value_scaling,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StageId {
    Rotate,
    NormalizeFlatDark,
    NormalizeAirRegion,
    ValueScaling,
    Crop,
    StripeRemoval,
    Rebin,
    Outliers,
    Median,
    Gaussian,
    CutOff,
    MinusLog,
    RingRemoval,
    CircularMask,
    Clip,
}

impl StageId {
    pub const ALL: [StageId; 15] = [
        StageId::Rotate,
        StageId::NormalizeFlatDark,
        StageId::NormalizeAirRegion,
        StageId::ValueScaling,
        StageId::Crop,
        StageId::StripeRemoval,
        StageId::Rebin,
        StageId::Outliers,
        StageId::Median,
        StageId::Gaussian,
        StageId::CutOff,
        StageId::MinusLog,
        StageId::RingRemoval,
        StageId::CircularMask,
        StageId::Clip,
    ];

    /// Config and CLI key.
    pub fn key(self) -> &'static str {
        match self {
            StageId::Rotate => "rotate",
            StageId::NormalizeFlatDark => "normalize_flat_dark",
            StageId::NormalizeAirRegion => "normalize_air_region",
            StageId::ValueScaling => "value_scaling",
            StageId::Crop => "crop",
            StageId::StripeRemoval => "stripe_removal",
            StageId::Rebin => "rebin",
            StageId::Outliers => "outliers",
            StageId::Median => "median",
            StageId::Gaussian => "gaussian",
            StageId::CutOff => "cut_off",
            StageId::MinusLog => "minus_log",
            StageId::RingRemoval => "ring_removal",
            StageId::CircularMask => "circular_mask",
            StageId::Clip => "clip",
        }
    }

    pub fn from_key(key: &str) -> Option<StageId> {
        StageId::ALL.into_iter().find(|id| id.key() == key)
    }

    pub fn stage(self) -> &'static dyn FilterStage {
        match self {
            StageId::Rotate => &rotate::Rotate,
            StageId::NormalizeFlatDark => &flat_dark::NormalizeFlatDark,
            StageId::NormalizeAirRegion => &air_region::NormalizeAirRegion,
            StageId::ValueScaling => &value_scaling::ValueScaling,
            StageId::Crop => &crop::Crop,
            StageId::StripeRemoval => &stripe::StripeRemoval,
            StageId::Rebin => &rebin::Rebin,
            StageId::Outliers => &outliers::Outliers,
            StageId::Median => &median::Median,
            StageId::Gaussian => &gaussian::Gaussian,
            StageId::CutOff => &cut_off::CutOff,
            StageId::MinusLog => &minus_log::MinusLog,
            StageId::RingRemoval => &ring::RingRemoval,
            StageId::CircularMask => &circular_mask::CircularMask,
            StageId::Clip => &clip::Clip,
        }
    }

    /// Chains this stage may appear in.
    pub fn phases(self) -> &'static [Phase] {
        match self {
            StageId::Outliers | StageId::Median | StageId::Gaussian => &[Phase::Pre, Phase::Post],
            StageId::RingRemoval | StageId::CircularMask | StageId::Clip => &[Phase::Post],
            _ => &[Phase::Pre],
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for StageId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StageId::from_key(s.trim()).ok_or_else(|| {
            let known: Vec<&str> = StageId::ALL.iter().map(|id| id.key()).collect();
            format!("unknown stage '{s}' (known: {})", known.join(", "))
        })
    }
}

/// One step of the pre-processing chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Record the value-scaling factor from the not-yet-normalized sample.
    CaptureScaleFactor,
    Stage(StageId),
}

pub const PRE_STEPS: &[Step] = &[
    Step::Stage(StageId::Rotate),
    Step::CaptureScaleFactor,
    Step::Stage(StageId::NormalizeFlatDark),
    Step::Stage(StageId::NormalizeAirRegion),
    Step::Stage(StageId::ValueScaling),
    Step::Stage(StageId::Crop),
    Step::Stage(StageId::StripeRemoval),
    Step::Stage(StageId::Rebin),
    Step::Stage(StageId::Outliers),
    Step::Stage(StageId::Median),
    Step::Stage(StageId::Gaussian),
    Step::Stage(StageId::CutOff),
    Step::Stage(StageId::MinusLog),
];

pub const POST_STAGES: &[StageId] = &[
    StageId::Outliers,
    StageId::RingRemoval,
    StageId::Median,
    StageId::Gaussian,
    StageId::CircularMask,
    StageId::Clip,
];

/// Stage ids of `phase` in execution order.
pub fn chain(phase: Phase) -> Vec<StageId> {
    match phase {
        Phase::Pre => PRE_STEPS
            .iter()
            .filter_map(|step| match step {
                Step::Stage(id) => Some(*id),
                Step::CaptureScaleFactor => None,
            })
            .collect(),
        Phase::Post => POST_STAGES.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_round_trip() {
        for id in StageId::ALL {
            assert_eq!(StageId::from_key(id.key()), Some(id));
            assert_eq!(id.stage().id(), id);
        }
        assert!("nope".parse::<StageId>().is_err());
    }

    #[test]
    fn chains_agree_with_declared_phases() {
        for phase in [Phase::Pre, Phase::Post] {
            for id in chain(phase) {
                assert!(id.phases().contains(&phase), "{id} in {phase:?}");
            }
        }
        for id in StageId::ALL {
            for phase in id.phases() {
                assert!(chain(*phase).contains(&id), "{id} missing from {phase:?}");
            }
        }
    }

    #[test]
    fn stripe_removal_precedes_rebin_and_minus_log_is_last() {
        let pre = chain(Phase::Pre);
        let pos = |id| pre.iter().position(|x| *x == id).unwrap();
        assert!(pos(StageId::StripeRemoval) < pos(StageId::Rebin));
        assert!(pos(StageId::Crop) < pos(StageId::StripeRemoval));
        assert_eq!(pre.last(), Some(&StageId::MinusLog));
        assert_eq!(PRE_STEPS[1], Step::CaptureScaleFactor);
    }
}
