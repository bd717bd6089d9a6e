use nalgebra::{DMatrix, DVector};
use thiserror::Error;

/// Default CELU `α` of the published ANI networks.
pub const DEFAULT_CELU_ALPHA: f64 = 0.1;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum NetworkShapeError {
    #[error("Network has no layers")]
    Empty,
    #[error("Layer {layer} has {rows} weight rows but {bias} bias entries")]
    BiasMismatch {
        layer: usize,
        rows: usize,
        bias: usize,
    },
    #[error("Layer {layer} expects {expected} inputs but the previous layer produces {found}")]
    Chain {
        layer: usize,
        expected: usize,
        found: usize,
    },
    #[error("Final layer must produce a single output, found {0}")]
    Output(usize),
}

/// A fully connected layer, `y = W x + b`, with `W` stored as `out × in`.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub weights: DMatrix<f64>,
    pub bias: DVector<f64>,
}

/// A per-species atomic network: linear layers with CELU activations between them and a
/// scalar output, the atomic energy contribution in Hartree.
#[derive(Debug, Clone, PartialEq)]
pub struct AtomicNetwork {
    layers: Vec<Layer>,
    alpha: f64,
}

impl AtomicNetwork {
    pub fn new(layers: Vec<Layer>, alpha: f64) -> Result<Self, NetworkShapeError> {
        if layers.is_empty() {
            return Err(NetworkShapeError::Empty);
        }
        for (i, layer) in layers.iter().enumerate() {
            if layer.weights.nrows() != layer.bias.len() {
                return Err(NetworkShapeError::BiasMismatch {
                    layer: i,
                    rows: layer.weights.nrows(),
                    bias: layer.bias.len(),
                });
            }
            if i > 0 {
                let found = layers[i - 1].weights.nrows();
                if layer.weights.ncols() != found {
                    return Err(NetworkShapeError::Chain {
                        layer: i,
                        expected: layer.weights.ncols(),
                        found,
                    });
                }
            }
        }
        let outputs = layers[layers.len() - 1].weights.nrows();
        if outputs != 1 {
            return Err(NetworkShapeError::Output(outputs));
        }
        Ok(Self { layers, alpha })
    }

    pub fn input_width(&self) -> usize {
        self.layers[0].weights.ncols()
    }

    pub fn forward(&self, input: &DVector<f64>) -> f64 {
        let last = self.layers.len() - 1;
        let mut h = input.clone();
        for (i, layer) in self.layers.iter().enumerate() {
            let z = &layer.weights * &h + &layer.bias;
            h = if i < last {
                z.map(|x| celu(x, self.alpha))
            } else {
                z
            };
        }
        h[0]
    }

    /// Returns the output together with its gradient with respect to the input.
    pub fn forward_with_gradient(&self, input: &DVector<f64>) -> (f64, DVector<f64>) {
        let last = self.layers.len() - 1;
        let mut pre_activations = Vec::with_capacity(last);
        let mut h = input.clone();
        for (i, layer) in self.layers.iter().enumerate() {
            let z = &layer.weights * &h + &layer.bias;
            if i < last {
                h = z.map(|x| celu(x, self.alpha));
                pre_activations.push(z);
            } else {
                h = z;
            }
        }
        let output = h[0];

        let mut grad = DVector::from_element(1, 1.0);
        for (i, layer) in self.layers.iter().enumerate().rev() {
            grad = layer.weights.tr_mul(&grad);
            if i > 0 {
                let z = &pre_activations[i - 1];
                grad.component_mul_assign(&z.map(|x| celu_derivative(x, self.alpha)));
            }
        }
        (output, grad)
    }
}

#[inline]
pub fn celu(x: f64, alpha: f64) -> f64 {
    if x > 0.0 {
        x
    } else {
        alpha * ((x / alpha).exp() - 1.0)
    }
}

#[inline]
pub fn celu_derivative(x: f64, alpha: f64) -> f64 {
    if x > 0.0 { 1.0 } else { (x / alpha).exp() }
}
