//! Land-cover classification scheme: ordered registry of class codes,
//! names and display colours.
//!
//! The order of classes is the canonical class index used by legends,
//! area tables and index recovery.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{LulcError, Result};

/// One land-cover class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LandCoverClass {
    /// Raw category value stored in categorical rasters.
    pub code: u16,
    pub name: String,
    /// 6-digit hex colour without the leading `#`.
    pub color: String,
}

/// Legend row as rendered by a presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LegendEntry {
    pub color: String,
    pub code: u16,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<LandCoverClass>", into = "Vec<LandCoverClass>")]
pub struct ClassificationScheme {
    classes: Vec<LandCoverClass>,
    #[serde(skip)]
    index: HashMap<u16, usize>,
}

impl ClassificationScheme {
    /// Build a scheme from classes in canonical order.
    ///
    /// Codes must be unique and positive, colours must be 6-digit hex.
    pub fn new(classes: Vec<LandCoverClass>) -> Result<Self> {
        if classes.is_empty() {
            return Err(LulcError::EmptyScheme);
        }
        let mut index = HashMap::with_capacity(classes.len());
        for (i, class) in classes.iter().enumerate() {
            if class.code == 0 {
                return Err(LulcError::InvalidParameter {
                    name: "code",
                    reason: format!("class `{}` has code 0; codes must be positive", class.name),
                });
            }
            if parse_hex(&class.color).is_none() {
                let color = class.color.clone();
                return Err(LulcError::InvalidColor { code: class.code, color });
            }
            if index.insert(class.code, i).is_some() {
                return Err(LulcError::DuplicateClassCode { code: class.code });
            }
        }
        Ok(Self { classes, index })
    }

    /// Build a scheme from the three parallel lists used by map legends.
    pub fn from_lists(codes: &[u16], names: &[&str], colors: &[&str]) -> Result<Self> {
        if codes.len() != names.len() || codes.len() != colors.len() {
            return Err(LulcError::InvalidParameter {
                name: "scheme",
                reason: format!(
                    "{} codes, {} names and {} colours must have equal length",
                    codes.len(),
                    names.len(),
                    colors.len()
                ),
            });
        }
        let classes = codes
            .iter()
            .zip(names)
            .zip(colors)
            .map(|((&code, name), color)| LandCoverClass {
                code,
                name: (*name).to_string(),
                color: (*color).to_string(),
            })
            .collect();
        Self::new(classes)
    }

    /// Nine-class global land-cover legend (WorldCover-style codes 10..=100).
    pub fn worldcover() -> Self {
        const CODES: [u16; 9] = [10, 20, 30, 40, 50, 60, 70, 80, 100];
        const NAMES: [&str; 9] = [
            "Tree cover",
            "Shrubland",
            "Grassland",
            "Cropland",
            "Built-up",
            "Bare or sparse vegetation",
            "Snow and ice",
            "Permanent water bodies",
            "Moss and lichen",
        ];
        const PALETTE: [&str; 9] = [
            "006400", "ffbb22", "ffff4c", "f096ff", "fa0000", "b4b4b4", "f0f0f0", "0064c8",
            "fae6a0",
        ];
        let classes = CODES
            .iter()
            .zip(NAMES)
            .zip(PALETTE)
            .map(|((&code, name), color)| LandCoverClass {
                code,
                name: name.to_string(),
                color: color.to_string(),
            })
            .collect::<Vec<_>>();
        let index = classes.iter().enumerate().map(|(i, c)| (c.code, i)).collect();
        Self { classes, index }
    }

    /// Name of the class registered under `code`.
    pub fn lookup(&self, code: u16) -> Result<&str> {
        self.class(code).map(|c| c.name.as_str())
    }

    pub fn class(&self, code: u16) -> Result<&LandCoverClass> {
        self.index_of(code).map(|i| &self.classes[i])
    }

    /// Canonical position of `code` in the scheme.
    pub fn index_of(&self, code: u16) -> Result<usize> {
        self.index
            .get(&code)
            .copied()
            .ok_or(LulcError::UnknownClassCode { code: u32::from(code) })
    }

    pub fn contains(&self, code: u16) -> bool {
        self.index.contains_key(&code)
    }

    pub fn max_code(&self) -> u16 {
        self.classes.iter().map(|c| c.code).max().unwrap_or(0)
    }

    pub fn size(&self) -> usize {
        self.classes.len()
    }

    pub fn classes(&self) -> &[LandCoverClass] {
        &self.classes
    }

    pub fn codes(&self) -> impl Iterator<Item = u16> + '_ {
        self.classes.iter().map(|c| c.code)
    }

    /// Class at canonical position `index`.
    pub fn get(&self, index: usize) -> Option<&LandCoverClass> {
        self.classes.get(index)
    }

    pub fn legend(&self) -> Vec<LegendEntry> {
        self.classes
            .iter()
            .map(|c| LegendEntry { color: c.color.clone(), code: c.code, name: c.name.clone() })
            .collect()
    }

    /// Display colour of `code` as RGB bytes.
    pub fn rgb(&self, code: u16) -> Result<[u8; 3]> {
        let class = self.class(code)?;
        parse_hex(&class.color)
            .ok_or_else(|| LulcError::InvalidColor { code, color: class.color.clone() })
    }
}

impl TryFrom<Vec<LandCoverClass>> for ClassificationScheme {
    type Error = LulcError;

    fn try_from(classes: Vec<LandCoverClass>) -> Result<Self> {
        Self::new(classes)
    }
}

impl From<ClassificationScheme> for Vec<LandCoverClass> {
    fn from(scheme: ClassificationScheme) -> Self {
        scheme.classes
    }
}

impl Default for ClassificationScheme {
    fn default() -> Self {
        Self::worldcover()
    }
}

fn parse_hex(color: &str) -> Option<[u8; 3]> {
    let hex = color.strip_prefix('#').unwrap_or(color);
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some([channel(0)?, channel(2)?, channel(4)?])
}
