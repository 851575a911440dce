/// What a [`crate::Reading`] value represents once scaled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Kind {
    Energy,
    Power,
}

/// Collapses the C++ original's `scalar_unit` template hierarchy
/// (`original_source/nrg/src/units.hpp`) into a single runtime-scaled
/// value: a raw counter reading times a ratio fixed at reader construction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Quantity {
    pub value: f64,
    pub scale: f64,
    pub kind: Kind,
}

impl Quantity {
    pub fn new(raw: f64, scale: f64, kind: Kind) -> Self {
        Quantity {
            value: raw * scale,
            scale,
            kind,
        }
    }

    pub fn joules(&self) -> Option<f64> {
        (self.kind == Kind::Energy).then_some(self.value)
    }

    pub fn watts(&self) -> Option<f64> {
        (self.kind == Kind::Power).then_some(self.value)
    }
}
