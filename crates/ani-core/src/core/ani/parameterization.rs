use super::aev::AevParams;
use std::f64::consts::PI;
use std::fmt;
use thiserror::Error;

/// The only model family this driver evaluates.
pub const MODEL_FAMILY: &str = "ANI";

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum SelectionError {
    #[error("Unknown model '{0}'. Only the 'ANI' family of models is supported.")]
    UnknownModel(String),
    #[error("Unknown ANI parameterization '{0}'. Expected one of: ANI-1x, ANI-1ccx, ANI-2x.")]
    UnknownParameterization(String),
}

/// A published, pretrained ANI potential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Parameterization {
    Ani1x,
    Ani1ccx,
    Ani2x,
}

const PARAMETERIZATIONS: [(&str, Parameterization); 3] = [
    ("ANI-1x", Parameterization::Ani1x),
    ("ANI-1ccx", Parameterization::Ani1ccx),
    ("ANI-2x", Parameterization::Ani2x),
];

const HCNO: [&str; 4] = ["H", "C", "N", "O"];
const HCNOSFCL: [&str; 7] = ["H", "C", "N", "O", "S", "F", "Cl"];

impl Parameterization {
    /// Resolves a model family and parameterization name, e.g. `("ANI", "ANI-2x")`.
    pub fn select(model: &str, parameterization: &str) -> Result<Self, SelectionError> {
        if model.trim() != MODEL_FAMILY {
            return Err(SelectionError::UnknownModel(model.to_string()));
        }
        Self::from_name(parameterization)
    }

    pub fn from_name(name: &str) -> Result<Self, SelectionError> {
        PARAMETERIZATIONS
            .iter()
            .find(|(n, _)| *n == name.trim())
            .map(|(_, p)| *p)
            .ok_or_else(|| SelectionError::UnknownParameterization(name.to_string()))
    }

    pub fn all() -> impl Iterator<Item = Parameterization> {
        PARAMETERIZATIONS.iter().map(|(_, p)| *p)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Ani1x => "ANI-1x",
            Self::Ani1ccx => "ANI-1ccx",
            Self::Ani2x => "ANI-2x",
        }
    }

    /// Sub-directory of the model directory holding this potential's files.
    pub fn directory_name(self) -> &'static str {
        match self {
            Self::Ani1x => "ani-1x",
            Self::Ani1ccx => "ani-1ccx",
            Self::Ani2x => "ani-2x",
        }
    }

    /// Element symbols in the order the networks index them.
    pub fn species(self) -> &'static [&'static str] {
        match self {
            Self::Ani1x | Self::Ani1ccx => &HCNO,
            Self::Ani2x => &HCNOSFCL,
        }
    }

    pub fn covers(self, symbol: &str) -> bool {
        self.species().contains(&symbol.trim())
    }

    pub fn species_index(self, symbol: &str) -> Option<usize> {
        self.species().iter().position(|s| *s == symbol.trim())
    }

    /// Atomic environment vector constants of the published potential.
    pub fn aev_params(self) -> AevParams {
        match self {
            Self::Ani1x | Self::Ani1ccx => AevParams {
                radial_cutoff: 5.2,
                angular_cutoff: 3.5,
                radial_eta: 16.0,
                radial_shifts: evenly_spaced(0.9, 0.26875, 16),
                angular_eta: 8.0,
                angular_zeta: 32.0,
                angular_shifts: vec![0.9, 1.55, 2.2, 2.85],
                angle_sections: angle_sections(8),
            },
            Self::Ani2x => AevParams {
                radial_cutoff: 5.1,
                angular_cutoff: 3.5,
                radial_eta: 19.7,
                radial_shifts: evenly_spaced(0.8, 0.26875, 16),
                angular_eta: 12.5,
                angular_zeta: 14.1,
                angular_shifts: evenly_spaced(0.8, 0.3375, 8),
                angle_sections: angle_sections(4),
            },
        }
    }
}

impl fmt::Display for Parameterization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn evenly_spaced(start: f64, step: f64, count: usize) -> Vec<f64> {
    (0..count).map(|k| start + step * k as f64).collect()
}

/// Centers of `count` equal sections of `[0, π]`.
fn angle_sections(count: usize) -> Vec<f64> {
    (0..count)
        .map(|k| (2 * k + 1) as f64 * PI / (2 * count) as f64)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_names_resolve_to_their_parameterization() {
        assert_eq!(
            Parameterization::select("ANI", "ANI-1x"),
            Ok(Parameterization::Ani1x)
        );
        assert_eq!(
            Parameterization::select("ANI", "ANI-1ccx"),
            Ok(Parameterization::Ani1ccx)
        );
        assert_eq!(
            Parameterization::select("ANI", "ANI-2x"),
            Ok(Parameterization::Ani2x)
        );
    }

    #[test]
    fn unknown_family_is_rejected_before_the_parameterization() {
        assert_eq!(
            Parameterization::select("MACE", "not-a-model"),
            Err(SelectionError::UnknownModel("MACE".to_string()))
        );
    }

    #[test]
    fn unknown_parameterization_is_rejected() {
        assert_eq!(
            Parameterization::select("ANI", "ANI-3x"),
            Err(SelectionError::UnknownParameterization("ANI-3x".to_string()))
        );
        assert!(Parameterization::from_name("ani-2x").is_err());
    }

    #[test]
    fn covered_elements_match_the_published_potentials() {
        for p in [Parameterization::Ani1x, Parameterization::Ani1ccx] {
            for symbol in ["C", "H", "N", "O"] {
                assert!(p.covers(symbol));
            }
            for symbol in ["F", "S", "Cl"] {
                assert!(!p.covers(symbol));
            }
        }
        for symbol in ["C", "H", "N", "O", "F", "S", "Cl"] {
            assert!(Parameterization::Ani2x.covers(symbol));
        }
        assert!(!Parameterization::Ani2x.covers("Br"));
    }

    #[test]
    fn aev_constants_give_the_published_vector_lengths() {
        let ani1x = Parameterization::Ani1x.aev_params();
        assert_eq!(ani1x.length(4), 384);
        assert!((ani1x.radial_shifts[15] - 4.93125).abs() < 1e-12);
        assert!((ani1x.angle_sections[0] - 0.19634954).abs() < 1e-8);

        let ani2x = Parameterization::Ani2x.aev_params();
        assert_eq!(ani2x.length(7), 1008);
        assert!((ani2x.angular_shifts[7] - 3.1625).abs() < 1e-12);
        assert!((ani2x.angle_sections[3] - 2.74889357).abs() < 1e-8);
    }
}
