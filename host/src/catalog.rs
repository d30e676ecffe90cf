//! Named color catalog
//!
//! Uses CIE L*a*b* with the CIEDE2000 metric for perceptual color matching.
//! Names and Italian translations come from the web color list extended with
//! common pigment and fabric names.

use serde::Serialize;
use utoipa::ToSchema;

use crate::colorspace::{Lab, Rgb};
use crate::delta_e::delta_e_2000;
use crate::error::AppError;

/// Static catalog row
#[derive(Debug, Clone, Copy)]
pub struct ColorDef {
    pub name: &'static str,
    pub localized_name: &'static str,
    pub rgb: Rgb,
}

impl ColorDef {
    pub const fn new(name: &'static str, localized_name: &'static str, r: u8, g: u8, b: u8) -> Self {
        Self {
            name,
            localized_name,
            rgb: Rgb::new(r, g, b),
        }
    }
}

/// Built-in catalog, in match priority order (first minimum wins)
pub const COLOR_DATABASE: &[ColorDef] = &[
    // Reds
    ColorDef::new("Red", "Rosso", 255, 0, 0),
    ColorDef::new("Dark Red", "Rosso Scuro", 139, 0, 0),
    ColorDef::new("Crimson", "Cremisi", 220, 20, 60),
    ColorDef::new("Indian Red", "Rosso Indiano", 205, 92, 92),
    ColorDef::new("Light Coral", "Corallo Chiaro", 240, 128, 128),
    ColorDef::new("Salmon", "Salmone", 250, 128, 114),
    ColorDef::new("Dark Salmon", "Salmone Scuro", 233, 150, 122),
    ColorDef::new("Light Salmon", "Salmone Chiaro", 255, 160, 122),
    ColorDef::new("Fire Brick", "Mattone", 178, 34, 34),
    ColorDef::new("Maroon", "Marrone Rosso", 128, 0, 0),

    // Oranges
    ColorDef::new("Orange", "Arancione", 255, 165, 0),
    ColorDef::new("Dark Orange", "Arancione Scuro", 255, 140, 0),
    ColorDef::new("Orange Red", "Rosso Arancio", 255, 69, 0),
    ColorDef::new("Tomato", "Pomodoro", 255, 99, 71),
    ColorDef::new("Coral", "Corallo", 255, 127, 80),
    ColorDef::new("Peach", "Pesca", 255, 218, 185),
    ColorDef::new("Apricot", "Albicocca", 251, 206, 177),
    ColorDef::new("Tangerine", "Mandarino", 255, 159, 0),
    ColorDef::new("Burnt Orange", "Arancione Bruciato", 204, 85, 0),
    ColorDef::new("Pumpkin", "Zucca", 255, 117, 24),

    // Yellows
    ColorDef::new("Yellow", "Giallo", 255, 255, 0),
    ColorDef::new("Light Yellow", "Giallo Chiaro", 255, 255, 224),
    ColorDef::new("Lemon", "Limone", 255, 247, 0),
    ColorDef::new("Gold", "Oro", 255, 215, 0),
    ColorDef::new("Golden Yellow", "Giallo Dorato", 255, 223, 0),
    ColorDef::new("Mustard", "Senape", 255, 219, 88),
    ColorDef::new("Canary Yellow", "Giallo Canarino", 255, 239, 0),
    ColorDef::new("Banana Yellow", "Giallo Banana", 255, 225, 53),
    ColorDef::new("Amber", "Ambra", 255, 191, 0),
    ColorDef::new("Champagne", "Champagne", 247, 231, 206),
    ColorDef::new("Cream", "Crema", 255, 253, 208),
    ColorDef::new("Khaki", "Cachi", 240, 230, 140),
    ColorDef::new("Dark Khaki", "Cachi Scuro", 189, 183, 107),

    // Greens
    ColorDef::new("Green", "Verde", 0, 128, 0),
    ColorDef::new("Lime", "Lime", 0, 255, 0),
    ColorDef::new("Bright Green", "Verde Brillante", 0, 255, 0),
    ColorDef::new("Dark Green", "Verde Scuro", 0, 100, 0),
    ColorDef::new("Forest Green", "Verde Foresta", 34, 139, 34),
    ColorDef::new("Sea Green", "Verde Mare", 46, 139, 87),
    ColorDef::new("Medium Sea Green", "Verde Mare Medio", 60, 179, 113),
    ColorDef::new("Light Green", "Verde Chiaro", 144, 238, 144),
    ColorDef::new("Pale Green", "Verde Pallido", 152, 251, 152),
    ColorDef::new("Spring Green", "Verde Primavera", 0, 255, 127),
    ColorDef::new("Lawn Green", "Verde Prato", 124, 252, 0),
    ColorDef::new("Chartreuse", "Chartreuse", 127, 255, 0),
    ColorDef::new("Yellow Green", "Giallo Verde", 154, 205, 50),
    ColorDef::new("Olive", "Oliva", 128, 128, 0),
    ColorDef::new("Olive Drab", "Oliva Opaco", 107, 142, 35),
    ColorDef::new("Dark Olive", "Oliva Scuro", 85, 107, 47),
    ColorDef::new("Mint", "Menta", 189, 252, 201),
    ColorDef::new("Emerald", "Smeraldo", 80, 200, 120),
    ColorDef::new("Jade", "Giada", 0, 168, 107),
    ColorDef::new("Teal Green", "Verde Petrolio", 0, 128, 128),

    // Cyans
    ColorDef::new("Cyan", "Ciano", 0, 255, 255),
    ColorDef::new("Aqua", "Acqua", 0, 255, 255),
    ColorDef::new("Light Cyan", "Ciano Chiaro", 224, 255, 255),
    ColorDef::new("Dark Cyan", "Ciano Scuro", 0, 139, 139),
    ColorDef::new("Turquoise", "Turchese", 64, 224, 208),
    ColorDef::new("Dark Turquoise", "Turchese Scuro", 0, 206, 209),
    ColorDef::new("Medium Turquoise", "Turchese Medio", 72, 209, 204),
    ColorDef::new("Pale Turquoise", "Turchese Pallido", 175, 238, 238),
    ColorDef::new("Aquamarine", "Acquamarina", 127, 255, 212),
    ColorDef::new("Teal", "Petrolio", 0, 128, 128),
    ColorDef::new("Cadet Blue", "Blu Cadetto", 95, 158, 160),

    // Blues
    ColorDef::new("Blue", "Blu", 0, 0, 255),
    ColorDef::new("Light Blue", "Blu Chiaro", 173, 216, 230),
    ColorDef::new("Sky Blue", "Azzurro Cielo", 135, 206, 235),
    ColorDef::new("Light Sky Blue", "Azzurro Cielo Chiaro", 135, 206, 250),
    ColorDef::new("Deep Sky Blue", "Azzurro Intenso", 0, 191, 255),
    ColorDef::new("Dodger Blue", "Blu Dodger", 30, 144, 255),
    ColorDef::new("Cornflower Blue", "Blu Fiordaliso", 100, 149, 237),
    ColorDef::new("Steel Blue", "Blu Acciaio", 70, 130, 180),
    ColorDef::new("Royal Blue", "Blu Reale", 65, 105, 225),
    ColorDef::new("Medium Blue", "Blu Medio", 0, 0, 205),
    ColorDef::new("Dark Blue", "Blu Scuro", 0, 0, 139),
    ColorDef::new("Navy", "Blu Navy", 0, 0, 128),
    ColorDef::new("Midnight Blue", "Blu Mezzanotte", 25, 25, 112),
    ColorDef::new("Cobalt Blue", "Blu Cobalto", 0, 71, 171),
    ColorDef::new("Electric Blue", "Blu Elettrico", 125, 249, 255),
    ColorDef::new("Azure", "Azzurro", 0, 127, 255),
    ColorDef::new("Powder Blue", "Blu Polvere", 176, 224, 230),
    ColorDef::new("Alice Blue", "Blu Alice", 240, 248, 255),

    // Purples
    ColorDef::new("Purple", "Viola", 128, 0, 128),
    ColorDef::new("Violet", "Violetto", 238, 130, 238),
    ColorDef::new("Dark Violet", "Violetto Scuro", 148, 0, 211),
    ColorDef::new("Blue Violet", "Blu Violetto", 138, 43, 226),
    ColorDef::new("Dark Orchid", "Orchidea Scura", 153, 50, 204),
    ColorDef::new("Medium Orchid", "Orchidea Media", 186, 85, 211),
    ColorDef::new("Orchid", "Orchidea", 218, 112, 214),
    ColorDef::new("Plum", "Prugna", 221, 160, 221),
    ColorDef::new("Medium Purple", "Porpora Medio", 147, 112, 219),
    ColorDef::new("Indigo", "Indaco", 75, 0, 130),
    ColorDef::new("Slate Blue", "Blu Ardesia", 106, 90, 205),
    ColorDef::new("Dark Slate Blue", "Blu Ardesia Scuro", 72, 61, 139),
    ColorDef::new("Lavender", "Lavanda", 230, 230, 250),
    ColorDef::new("Thistle", "Cardo", 216, 191, 216),
    ColorDef::new("Mauve", "Malva", 224, 176, 255),
    ColorDef::new("Amethyst", "Ametista", 153, 102, 204),
    ColorDef::new("Grape", "Uva", 111, 45, 168),
    ColorDef::new("Eggplant", "Melanzana", 97, 64, 81),

    // Pinks and magentas
    ColorDef::new("Pink", "Rosa", 255, 192, 203),
    ColorDef::new("Light Pink", "Rosa Chiaro", 255, 182, 193),
    ColorDef::new("Hot Pink", "Rosa Acceso", 255, 105, 180),
    ColorDef::new("Deep Pink", "Rosa Intenso", 255, 20, 147),
    ColorDef::new("Medium Violet Red", "Rosso Violetto Medio", 199, 21, 133),
    ColorDef::new("Pale Violet Red", "Rosso Violetto Pallido", 219, 112, 147),
    ColorDef::new("Magenta", "Magenta", 255, 0, 255),
    ColorDef::new("Fuchsia", "Fucsia", 255, 0, 255),
    ColorDef::new("Rose", "Rosa", 255, 0, 127),
    ColorDef::new("Blush", "Rosa Cipria", 222, 93, 131),
    ColorDef::new("Carnation Pink", "Rosa Garofano", 255, 166, 201),
    ColorDef::new("Flamingo", "Fenicottero", 252, 142, 172),
    ColorDef::new("Raspberry", "Lampone", 227, 11, 92),
    ColorDef::new("Cerise", "Ciliegia", 222, 49, 99),

    // Browns
    ColorDef::new("Brown", "Marrone", 165, 42, 42),
    ColorDef::new("Dark Brown", "Marrone Scuro", 101, 67, 33),
    ColorDef::new("Saddle Brown", "Marrone Sella", 139, 69, 19),
    ColorDef::new("Sienna", "Terra di Siena", 160, 82, 45),
    ColorDef::new("Chocolate", "Cioccolato", 210, 105, 30),
    ColorDef::new("Peru", "Peru", 205, 133, 63),
    ColorDef::new("Sandy Brown", "Marrone Sabbia", 244, 164, 96),
    ColorDef::new("Burly Wood", "Legno", 222, 184, 135),
    ColorDef::new("Tan", "Cuoio", 210, 180, 140),
    ColorDef::new("Rosy Brown", "Marrone Rosato", 188, 143, 143),
    ColorDef::new("Moccasin", "Mocassino", 255, 228, 181),
    ColorDef::new("Navajo White", "Bianco Navajo", 255, 222, 173),
    ColorDef::new("Wheat", "Grano", 245, 222, 179),
    ColorDef::new("Bisque", "Biscotto", 255, 228, 196),
    ColorDef::new("Blanched Almond", "Mandorla", 255, 235, 205),
    ColorDef::new("Cornsilk", "Seta di Mais", 255, 248, 220),
    ColorDef::new("Beige", "Beige", 245, 245, 220),
    ColorDef::new("Antique White", "Bianco Antico", 250, 235, 215),
    ColorDef::new("Papaya Whip", "Papaya", 255, 239, 213),
    ColorDef::new("Linen", "Lino", 250, 240, 230),
    ColorDef::new("Old Lace", "Pizzo Antico", 253, 245, 230),
    ColorDef::new("Coffee", "Caffè", 111, 78, 55),
    ColorDef::new("Caramel", "Caramello", 255, 213, 154),
    ColorDef::new("Rust", "Ruggine", 183, 65, 14),
    ColorDef::new("Copper", "Rame", 184, 115, 51),
    ColorDef::new("Bronze", "Bronzo", 205, 127, 50),
    ColorDef::new("Terracotta", "Terracotta", 226, 114, 91),

    // Grays
    ColorDef::new("Gray", "Grigio", 128, 128, 128),
    ColorDef::new("Dark Gray", "Grigio Scuro", 169, 169, 169),
    ColorDef::new("Dim Gray", "Grigio Tenue", 105, 105, 105),
    ColorDef::new("Light Gray", "Grigio Chiaro", 211, 211, 211),
    ColorDef::new("Silver", "Argento", 192, 192, 192),
    ColorDef::new("Light Slate Gray", "Grigio Ardesia Chiaro", 119, 136, 153),
    ColorDef::new("Slate Gray", "Grigio Ardesia", 112, 128, 144),
    ColorDef::new("Dark Slate Gray", "Grigio Ardesia Scuro", 47, 79, 79),
    ColorDef::new("Charcoal", "Carbone", 54, 69, 79),
    ColorDef::new("Ash Gray", "Grigio Cenere", 178, 190, 181),
    ColorDef::new("Gainsboro", "Gainsboro", 220, 220, 220),
    ColorDef::new("White Smoke", "Fumo Bianco", 245, 245, 245),

    // Whites and blacks
    ColorDef::new("White", "Bianco", 255, 255, 255),
    ColorDef::new("Snow", "Neve", 255, 250, 250),
    ColorDef::new("Honeydew", "Melata", 240, 255, 240),
    ColorDef::new("Mint Cream", "Crema Menta", 245, 255, 250),
    ColorDef::new("Ghost White", "Bianco Fantasma", 248, 248, 255),
    ColorDef::new("Floral White", "Bianco Floreale", 255, 250, 240),
    ColorDef::new("Seashell", "Conchiglia", 255, 245, 238),
    ColorDef::new("Ivory", "Avorio", 255, 255, 240),
    ColorDef::new("Black", "Nero", 0, 0, 0),
    ColorDef::new("Jet Black", "Nero Corvino", 52, 52, 52),
    ColorDef::new("Onyx", "Onice", 53, 56, 57),
    ColorDef::new("Ebony", "Ebano", 85, 93, 80),
];

/// A catalog color with its cached L*a*b* value
#[derive(Debug, Clone, PartialEq)]
pub struct NamedColor {
    pub name: String,
    pub localized_name: String,
    pub rgb: Rgb,
    pub hex: String,
    pub lab: Lab,
}

impl NamedColor {
    pub fn new(name: impl Into<String>, localized_name: impl Into<String>, rgb: Rgb) -> Self {
        Self {
            name: name.into(),
            localized_name: localized_name.into(),
            rgb,
            hex: rgb.to_hex(),
            lab: rgb.to_lab(),
        }
    }
}

impl From<&ColorDef> for NamedColor {
    fn from(def: &ColorDef) -> Self {
        Self::new(def.name, def.localized_name, def.rgb)
    }
}

/// How close a match is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PrecisionTier {
    /// Delta-E below 5
    Excellent,
    /// Delta-E below 15
    Good,
    Approximate,
}

impl PrecisionTier {
    pub fn from_distance(distance: f64) -> Self {
        if distance < 5.0 {
            PrecisionTier::Excellent
        } else if distance < 15.0 {
            PrecisionTier::Good
        } else {
            PrecisionTier::Approximate
        }
    }

    /// Marker shown next to a color name
    pub fn symbol(&self) -> &'static str {
        match self {
            PrecisionTier::Excellent => "●",
            PrecisionTier::Good => "◐",
            PrecisionTier::Approximate => "○",
        }
    }
}

/// Nearest catalog entry for a query color
#[derive(Debug, Clone, Copy)]
pub struct MatchResult<'a> {
    pub color: &'a NamedColor,
    pub distance: f64,
    pub tier: PrecisionTier,
}

/// Catalog matcher with precomputed L*a*b* values
pub struct ColorCatalog {
    colors: Vec<NamedColor>,
}

impl ColorCatalog {
    /// Build a catalog from an ordered, non-empty list of colors
    pub fn from_entries(colors: Vec<NamedColor>) -> Result<Self, AppError> {
        if colors.is_empty() {
            return Err(AppError::EmptyCatalog);
        }
        Ok(Self { colors })
    }

    /// The built-in catalog
    pub fn builtin() -> Self {
        Self {
            colors: COLOR_DATABASE.iter().map(NamedColor::from).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    /// Find nearest catalog color for an RGB query
    pub fn match_rgb(&self, rgb: Rgb) -> MatchResult<'_> {
        self.match_lab(rgb.to_lab())
    }

    /// Find nearest catalog color using CIEDE2000
    ///
    /// Linear scan; on equal distances the earlier entry wins.
    pub fn match_lab(&self, lab: Lab) -> MatchResult<'_> {
        let mut best = &self.colors[0];
        let mut best_dist = delta_e_2000(lab, best.lab);

        for color in &self.colors[1..] {
            let dist = delta_e_2000(lab, color.lab);
            if dist < best_dist {
                best_dist = dist;
                best = color;
            }
        }

        MatchResult {
            color: best,
            distance: best_dist,
            tier: PrecisionTier::from_distance(best_dist),
        }
    }
}

impl Default for ColorCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
