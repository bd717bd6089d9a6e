use super::error::{ComputeError, ConfigurationError};
use crate::core::ani::Parameterization;
use crate::core::schema::Document;
use nalgebra::Vector3;

/// Species index used for padding positions past a molecule's last atom.
pub const PADDING: i64 = -1;

/// Every configuration of a document as fixed-width numeric rows.
///
/// Row `i` holds configuration `i` in document order; rows shorter than the widest molecule
/// are padded with [`PADDING`] species at the origin.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    width: usize,
    species: Vec<Vec<i64>>,
    coordinates: Vec<Vec<Vector3<f64>>>,
    labels: Vec<String>,
}

impl Batch {
    pub fn from_document(
        document: &Document,
        parameterization: Parameterization,
    ) -> Result<Self, ConfigurationError> {
        let width = document
            .configurations()
            .map(|c| c.n_atoms())
            .max()
            .unwrap_or(0);

        let mut batch = Self {
            width,
            species: Vec::with_capacity(document.configuration_count()),
            coordinates: Vec::with_capacity(document.configuration_count()),
            labels: Vec::with_capacity(document.configuration_count()),
        };

        for (index, configuration) in document.configurations().enumerate() {
            let mut species = Vec::with_capacity(width);
            for symbol in &configuration.symbols {
                let s = parameterization.species_index(symbol).ok_or_else(|| {
                    ConfigurationError::UncoveredElement {
                        configuration: configuration.label(index),
                        symbol: symbol.clone(),
                        parameterization,
                    }
                })?;
                species.push(s as i64);
            }
            let mut coordinates: Vec<Vector3<f64>> = configuration
                .coordinates
                .values
                .iter()
                .map(|[x, y, z]| Vector3::new(*x, *y, *z))
                .collect();
            species.resize(width, PADDING);
            coordinates.resize(width, Vector3::zeros());

            batch.species.push(species);
            batch.coordinates.push(coordinates);
            batch.labels.push(configuration.label(index));
        }
        Ok(batch)
    }

    pub fn len(&self) -> usize {
        self.species.len()
    }

    pub fn is_empty(&self) -> bool {
        self.species.is_empty()
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn label(&self, row: usize) -> &str {
        &self.labels[row]
    }

    /// The unpadded species indices and positions of one row.
    pub fn molecule(&self, row: usize) -> Result<(Vec<usize>, Vec<Vector3<f64>>), ComputeError> {
        let species = &self.species[row];
        let coordinates = &self.coordinates[row];
        if species.len() != self.width || coordinates.len() != self.width {
            return Err(ComputeError::BatchShape {
                row,
                width: self.width,
                found: species.len().max(coordinates.len()),
            });
        }
        let n_atoms = species.iter().take_while(|s| **s != PADDING).count();
        let indices = species[..n_atoms].iter().map(|s| *s as usize).collect();
        Ok((indices, coordinates[..n_atoms].to_vec()))
    }
}
