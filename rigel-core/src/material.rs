//! Material and cross-section properties of line elements.
//!
//! Supports isotropic linear elastic materials and prismatic sections.

use crate::error::{Error, Result};

/// Isotropic linear elastic material of a member.
///
/// Density and damping only enter the mass and damping matrices; a static
/// solve never reads them.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    /// E, in Pa.
    pub youngs_modulus: f64,
    /// ν, used for the shear modulus of torsion.
    pub poissons_ratio: f64,
    /// ρ, in kg/m³.
    pub density: Option<f64>,
    /// Viscous damping per unit volume, used like density for the damping matrix.
    pub damping: Option<f64>,
}

impl Material {
    /// Elastic material without density or damping.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidMaterial`] unless `E > 0` and `-1 < ν < 0.5`.
    pub fn new(youngs_modulus: f64, poissons_ratio: f64) -> Result<Self> {
        if !(youngs_modulus > 0.0) {
            return Err(Error::InvalidMaterial(format!(
                "Young's modulus must be positive, got {}",
                youngs_modulus
            )));
        }
        if !(-1.0 < poissons_ratio && poissons_ratio < 0.5) {
            return Err(Error::InvalidMaterial(format!(
                "Poisson's ratio {} outside (-1, 0.5)",
                poissons_ratio
            )));
        }
        Ok(Self {
            youngs_modulus,
            poissons_ratio,
            density: None,
            damping: None,
        })
    }

    pub fn with_density(self, density: f64) -> Result<Self> {
        if !(density > 0.0) {
            return Err(Error::InvalidMaterial(format!("density must be positive, got {}", density)));
        }
        Ok(Self {
            density: Some(density),
            ..self
        })
    }

    pub fn with_damping(self, damping: f64) -> Result<Self> {
        if !(damping >= 0.0) {
            return Err(Error::InvalidMaterial(format!("damping must not be negative, got {}", damping)));
        }
        Ok(Self {
            damping: Some(damping),
            ..self
        })
    }

    /// G = E / 2(1 + ν).
    pub fn shear_modulus(&self) -> f64 {
        0.5 * self.youngs_modulus / (1.0 + self.poissons_ratio)
    }

    /// Density, or an error naming the matrix that needs it.
    pub fn require_density(&self, what: &str) -> Result<f64> {
        self.density.ok_or_else(|| {
            Error::InvalidMaterial(format!("{} matrix requires a material density", what))
        })
    }

    /// Structural steel: 200 GPa, ν 0.3, 7850 kg/m³.
    pub fn steel() -> Self {
        Self {
            youngs_modulus: 200e9,
            poissons_ratio: 0.3,
            density: Some(7850.0),
            damping: None,
        }
    }

    /// Normal weight concrete: 30 GPa, ν 0.2, 2500 kg/m³.
    pub fn concrete() -> Self {
        Self {
            youngs_modulus: 30e9,
            poissons_ratio: 0.2,
            density: Some(2500.0),
            damping: None,
        }
    }
}

/// Prismatic cross section of a frame member.
///
/// `iy` and `iz` are second moments of area about the local y and z axes,
/// `j` is the torsion constant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameSection {
    pub area: f64,
    pub iy: f64,
    pub iz: f64,
    pub j: f64,
}

impl FrameSection {
    /// Create a section, rejecting non-positive properties.
    pub fn new(area: f64, iy: f64, iz: f64, j: f64) -> Result<Self> {
        for (name, value) in [("area", area), ("iy", iy), ("iz", iz), ("j", j)] {
            if value <= 0.0 {
                return Err(Error::InvalidMaterial(format!(
                    "section {} must be positive, got {}",
                    name, value
                )));
            }
        }
        Ok(Self { area, iy, iz, j })
    }

    /// Solid rectangle of width `b` (along local z) and height `h` (along local y).
    pub fn rectangle(b: f64, h: f64) -> Result<Self> {
        let (long, short) = if b >= h { (b, h) } else { (h, b) };
        // Saint-Venant approximation for a solid rectangle
        let j = long * short.powi(3) * (1.0 / 3.0 - 0.21 * short / long * (1.0 - short.powi(4) / (12.0 * long.powi(4))));
        Self::new(b * h, h * b.powi(3) / 12.0, b * h.powi(3) / 12.0, j)
    }

    /// Solid circle of diameter `d`.
    pub fn circle(d: f64) -> Result<Self> {
        let r = d / 2.0;
        let i = std::f64::consts::PI * r.powi(4) / 4.0;
        Self::new(std::f64::consts::PI * r * r, i, i, 2.0 * i)
    }

    /// Polar moment of area Iy + Iz.
    pub fn polar_moment(&self) -> f64 {
        self.iy + self.iz
    }
}
