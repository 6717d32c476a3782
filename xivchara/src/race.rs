use crate::{
    error::XivError,
    pbd::{Deformer, PbdFile},
};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::fmt::Debug;

lazy_static! {
    // `c` must not be preceded by a letter, so `chara/` or `acc/` do not match
    static ref RACE_CODE_REGEX: Regex = Regex::new(r"(?:^|[^\p{L}])c(\d{4})").unwrap();
}

/// Longest parent walk accepted before a chain is considered unreachable.
const MAX_CHAIN_DEPTH: usize = 8;

/// Combined gender, race and NPC code as used in asset paths and .pbd headers.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u16)]
pub enum GenderRace {
    Unknown = 0,
    MidlanderMale = 101,
    MidlanderMaleNpc = 104,
    MidlanderFemale = 201,
    MidlanderFemaleNpc = 204,
    HighlanderMale = 301,
    HighlanderMaleNpc = 304,
    HighlanderFemale = 401,
    HighlanderFemaleNpc = 404,
    ElezenMale = 501,
    ElezenMaleNpc = 504,
    ElezenFemale = 601,
    ElezenFemaleNpc = 604,
    MiqoteMale = 701,
    MiqoteMaleNpc = 704,
    MiqoteFemale = 801,
    MiqoteFemaleNpc = 804,
    RoegadynMale = 901,
    RoegadynMaleNpc = 904,
    RoegadynFemale = 1001,
    RoegadynFemaleNpc = 1004,
    LalafellMale = 1101,
    LalafellMaleNpc = 1104,
    LalafellFemale = 1201,
    LalafellFemaleNpc = 1204,
    AuRaMale = 1301,
    AuRaMaleNpc = 1304,
    AuRaFemale = 1401,
    AuRaFemaleNpc = 1404,
    HrothgarMale = 1501,
    HrothgarMaleNpc = 1504,
    HrothgarFemale = 1601,
    HrothgarFemaleNpc = 1604,
    VieraMale = 1701,
    VieraMaleNpc = 1704,
    VieraFemale = 1801,
    VieraFemaleNpc = 1804,
    UnknownMaleNpc = 9104,
    UnknownFemaleNpc = 9204,
}

impl GenderRace {
    pub const ALL: [GenderRace; 39] = {
        use GenderRace::*;
        [
            Unknown,
            MidlanderMale,
            MidlanderMaleNpc,
            MidlanderFemale,
            MidlanderFemaleNpc,
            HighlanderMale,
            HighlanderMaleNpc,
            HighlanderFemale,
            HighlanderFemaleNpc,
            ElezenMale,
            ElezenMaleNpc,
            ElezenFemale,
            ElezenFemaleNpc,
            MiqoteMale,
            MiqoteMaleNpc,
            MiqoteFemale,
            MiqoteFemaleNpc,
            RoegadynMale,
            RoegadynMaleNpc,
            RoegadynFemale,
            RoegadynFemaleNpc,
            LalafellMale,
            LalafellMaleNpc,
            LalafellFemale,
            LalafellFemaleNpc,
            AuRaMale,
            AuRaMaleNpc,
            AuRaFemale,
            AuRaFemaleNpc,
            HrothgarMale,
            HrothgarMaleNpc,
            HrothgarFemale,
            HrothgarFemaleNpc,
            VieraMale,
            VieraMaleNpc,
            VieraFemale,
            VieraFemaleNpc,
            UnknownMaleNpc,
            UnknownFemaleNpc,
        ]
    };

    /// Unlisted codes map to [`GenderRace::Unknown`].
    pub fn from_code(code: u16) -> Self {
        Self::ALL
            .iter()
            .copied()
            .find(|race| race.code() == code)
            .unwrap_or(Self::Unknown)
    }

    pub fn code(self) -> u16 {
        self as u16
    }

    pub fn is_npc(self) -> bool {
        self.code() % 100 == 4
    }

    /// Body this one is deformed from.
    ///
    /// NPC codes have no table of their own and follow the general rule.
    pub fn parent(self) -> Option<Self> {
        use GenderRace::*;
        match self {
            MidlanderMale | Unknown => None,

            LalafellFemale => Some(LalafellMale),
            MidlanderFemale => Some(MidlanderMale),
            RoegadynFemale => Some(MidlanderFemale),

            other if (other.code() / 100) % 2 == 1 => Some(MidlanderMale),
            _ => Some(MidlanderFemale),
        }
    }
}

impl Debug for GenderRace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("GenderRace({:04})", self.code()))
    }
}

impl std::fmt::Display for GenderRace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("{:04}", self.code()))
    }
}

/// Extracts the `cNNNN` race code from an asset path.
pub fn parse_race_code(path: impl AsRef<str>) -> GenderRace {
    RACE_CODE_REGEX
        .captures(path.as_ref())
        .and_then(|cap| cap[1].parse::<u16>().ok())
        .map(GenderRace::from_code)
        .unwrap_or(GenderRace::Unknown)
}

/// Race codes to deform through when moving a mesh from `from` onto `to`,
/// in application order. `from` itself is not part of the chain.
///
/// Empty when `from == to` or when `to` does not descend from `from`.
pub fn race_chain(from: GenderRace, to: GenderRace) -> Vec<GenderRace> {
    let mut steps = Vec::new();
    let mut current = to;

    while current != from {
        if steps.len() == MAX_CHAIN_DEPTH {
            return Vec::new();
        }
        steps.push(current);
        match current.parent() {
            Some(parent) => current = parent,
            None => return Vec::new(),
        }
    }

    steps.reverse();
    steps
}

/// Resolves [`race_chain`] against a deformer table.
pub fn deform_chain(
    pbd: &PbdFile,
    from: GenderRace,
    to: GenderRace,
) -> Result<Vec<&Deformer>, XivError> {
    let chain = race_chain(from, to);
    tracing::debug!(%from, %to, steps = chain.len(), "resolved race deform chain");

    chain
        .into_iter()
        .map(|race| {
            pbd.deformer_for(race.code())
                .ok_or(XivError::PbdMissingDeformer(race.code()))
        })
        .collect()
}
