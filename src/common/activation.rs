use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activation {
    #[default] None,
    ReLU,
    // Reserved: no shipped model uses it, but the file format has a code for it.
    Sigmoid,
}

impl Activation {
    /// Maps the `activation` field of a convolution record.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Activation::None),
            1 => Some(Activation::ReLU),
            2 => Some(Activation::Sigmoid),
            _ => None,
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            Activation::None => 0,
            Activation::ReLU => 1,
            Activation::Sigmoid => 2,
        }
    }

    pub fn str(&self) -> &'static str {
        match self {
            Activation::None => "None",
            Activation::ReLU => "ReLU",
            Activation::Sigmoid => "Sigmoid",
        }
    }

    #[inline(always)]
    pub fn apply(&self, v: f32) -> f32 {
        match self {
            Activation::None => v,
            Activation::ReLU => if v > 0.0 { v } else { 0.0 },
            Activation::Sigmoid => 1.0 / (1.0 + (-v).exp()),
        }
    }
}

impl std::fmt::Display for Activation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.str())
    }
}
