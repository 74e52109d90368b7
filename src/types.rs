use fixed::types::I32F32;

/// Length in PDF points (1/72 inch), stored as fixed point so layout math is reproducible.
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd)]
pub struct Pt(I32F32);

impl Pt {
    pub const ZERO: Pt = Pt(I32F32::from_bits(0));
    pub const ONE: Pt = Pt(I32F32::from_bits(1 << 32));

    pub fn from_f32(value: f32) -> Pt {
        if !value.is_finite() {
            return Pt::ZERO;
        }
        let milli = (value as f64 * 1000.0).round();
        let milli = milli.clamp(i64::MIN as f64, i64::MAX as f64) as i64;
        Pt::from_milli_i64(milli)
    }

    pub fn from_i32(value: i32) -> Pt {
        Pt::from_milli_i64((value as i64) * 1000)
    }

    pub fn from_mm(value: f32) -> Pt {
        Pt::from_f32(value * 72.0 / 25.4)
    }

    pub fn to_f32(self) -> f32 {
        self.0.to_num()
    }

    pub fn to_milli_i64(self) -> i64 {
        let bits = self.0.to_bits() as i128;
        let denom = 1i128 << 32;
        let scaled = bits * 1000;
        let adj = if scaled >= 0 { denom / 2 } else { -denom / 2 };
        let milli = (scaled + adj) / denom;
        milli.clamp(i64::MIN as i128, i64::MAX as i128) as i64
    }

    pub fn from_milli_i64(milli: i64) -> Pt {
        let milli = milli as i128;
        let denom = 1i128 << 32;
        let adj = if milli >= 0 { 500 } else { -500 };
        let bits = (milli * denom + adj) / 1000;
        let bits = bits.clamp(i64::MIN as i128, i64::MAX as i128) as i64;
        Pt(I32F32::from_bits(bits))
    }

    pub fn max(self, other: Pt) -> Pt {
        if self >= other { self } else { other }
    }

    pub fn min(self, other: Pt) -> Pt {
        if self <= other { self } else { other }
    }

    /// Scales by `num / denom` with round-half-away-from-zero at milli-point precision.
    pub fn mul_ratio(self, num: i32, denom: i32) -> Pt {
        if denom == 0 {
            return Pt::ZERO;
        }
        let milli = self.to_milli_i64() as i128 * num as i128;
        let denom = denom as i128;
        let half = denom.abs() / 2;
        let value = if milli >= 0 {
            (milli + half) / denom
        } else {
            -((-milli + half) / denom)
        };
        Pt::from_milli_i64(value.clamp(i64::MIN as i128, i64::MAX as i128) as i64)
    }
}

impl std::ops::Add for Pt {
    type Output = Pt;
    fn add(self, rhs: Pt) -> Pt {
        Pt::from_milli_i64(self.to_milli_i64().saturating_add(rhs.to_milli_i64()))
    }
}

impl std::ops::AddAssign for Pt {
    fn add_assign(&mut self, rhs: Pt) {
        *self = *self + rhs;
    }
}

impl std::ops::Sub for Pt {
    type Output = Pt;
    fn sub(self, rhs: Pt) -> Pt {
        Pt::from_milli_i64(self.to_milli_i64().saturating_sub(rhs.to_milli_i64()))
    }
}

impl std::ops::SubAssign for Pt {
    fn sub_assign(&mut self, rhs: Pt) {
        *self = *self - rhs;
    }
}

impl std::ops::Mul<i32> for Pt {
    type Output = Pt;
    fn mul(self, rhs: i32) -> Pt {
        Pt::from_milli_i64(self.to_milli_i64().saturating_mul(rhs as i64))
    }
}

impl std::ops::Mul<f32> for Pt {
    type Output = Pt;
    fn mul(self, rhs: f32) -> Pt {
        if !rhs.is_finite() {
            return Pt::ZERO;
        }
        Pt::from_f32(self.to_f32() * rhs)
    }
}

impl std::ops::Div<i32> for Pt {
    type Output = Pt;
    fn div(self, rhs: i32) -> Pt {
        self.mul_ratio(1, rhs)
    }
}

impl std::ops::Neg for Pt {
    type Output = Pt;
    fn neg(self) -> Pt {
        Pt::from_milli_i64(-self.to_milli_i64())
    }
}

impl std::iter::Sum for Pt {
    fn sum<I: Iterator<Item = Pt>>(iter: I) -> Pt {
        iter.fold(Pt::ZERO, |acc, v| acc + v)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Size {
    pub width: Pt,
    pub height: Pt,
}

impl Size {
    pub fn a4() -> Self {
        Self {
            width: Pt::from_f32(595.276),
            height: Pt::from_f32(841.89),
        }
    }

    pub fn letter() -> Self {
        // 8.5in x 11in at 72pt/in.
        Self {
            width: Pt::from_f32(612.0),
            height: Pt::from_f32(792.0),
        }
    }

    pub fn landscape(self) -> Self {
        Self {
            width: self.height.max(self.width),
            height: self.height.min(self.width),
        }
    }
}

/// Page sizes certificates are printed on; each has a blank base page in the template dir.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PageGeometry {
    #[default]
    LandscapeA4,
    LandscapeLetter,
    PortraitA4,
    PortraitLetter,
}

impl PageGeometry {
    pub const ALL: [PageGeometry; 4] = [
        PageGeometry::LandscapeA4,
        PageGeometry::LandscapeLetter,
        PageGeometry::PortraitA4,
        PageGeometry::PortraitLetter,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PageGeometry::LandscapeA4 => "landscape-A4",
            PageGeometry::LandscapeLetter => "landscape-letter",
            PageGeometry::PortraitA4 => "portrait-A4",
            PageGeometry::PortraitLetter => "portrait-letter",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|geometry| geometry.as_str().eq_ignore_ascii_case(raw.trim()))
    }

    pub fn size(&self) -> Size {
        match self {
            PageGeometry::LandscapeA4 => Size::a4().landscape(),
            PageGeometry::LandscapeLetter => Size::letter().landscape(),
            PageGeometry::PortraitA4 => Size::a4(),
            PageGeometry::PortraitLetter => Size::letter(),
        }
    }

    /// File name of the pre-rendered blank page in the template directory.
    pub fn blank_file_name(&self) -> &'static str {
        match self {
            PageGeometry::LandscapeA4 => "blank.pdf",
            PageGeometry::LandscapeLetter => "blank-letter.pdf",
            PageGeometry::PortraitA4 => "blank-portrait-A4.pdf",
            PageGeometry::PortraitLetter => "blank-portrait-letter.pdf",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const BLACK: Color = Color {
        r: 0.0,
        g: 0.0,
        b: 0.0,
    };

    pub fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    /// Parses `#rrggbb`, `rrggbb` or `#rgb`.
    pub fn from_hex(raw: &str) -> Option<Self> {
        let hex = raw.trim().trim_start_matches('#');
        if !hex.is_ascii() {
            return None;
        }
        let expanded: String = match hex.len() {
            3 => hex.chars().flat_map(|c| [c, c]).collect(),
            6 => hex.to_string(),
            _ => return None,
        };
        let channel = |idx: usize| {
            u8::from_str_radix(&expanded[idx..idx + 2], 16)
                .ok()
                .map(|v| v as f32 / 255.0)
        };
        Some(Self {
            r: channel(0)?,
            g: channel(2)?,
            b: channel(4)?,
        })
    }
}
