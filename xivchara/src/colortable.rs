use crate::error::XivError;
use glam::{Vec2, Vec3};
use half::f16;
use serde::Serialize;
use std::borrow::Cow;

pub const NUM_ROWS: usize = 16;
pub const ROW_LEN: usize = 16;
pub const NUM_VALUES: usize = NUM_ROWS * ROW_LEN;
pub const NUM_BYTES: usize = NUM_VALUES * 2;

/// Texture format id of R16G16B16A16F color table textures.
pub const R16G16B16A16F: u32 = 0x2460;
const TEXEL_BYTES: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ColorTableLayout {
    /// 4x16 texels, one row per texel line.
    Legacy,
    /// 8x32 texels, of which the first half of the first 16 lines holds the classic table.
    Current,
}

impl ColorTableLayout {
    pub fn from_dimensions(width: u32, height: u32) -> Result<Self, XivError> {
        match (width, height) {
            (4, 16) => Ok(Self::Legacy),
            (8, 32) => Ok(Self::Current),
            _ => Err(XivError::ColorTableSize(width, height)),
        }
    }

    pub fn width(self) -> u32 {
        match self {
            Self::Legacy => 4,
            Self::Current => 8,
        }
    }

    pub fn height(self) -> u32 {
        match self {
            Self::Legacy => 16,
            Self::Current => 32,
        }
    }

    fn row_len(self) -> usize {
        self.width() as usize * 4
    }
}

/// One color table row, kept as raw half floats.
///
/// | halves  | field                |
/// |---------|----------------------|
/// | 0..3    | diffuse              |
/// | 3       | specular mask        |
/// | 4..7    | specular (fresnel)   |
/// | 7       | shininess            |
/// | 8..11   | emissive             |
/// | 11      | tile index           |
/// | 12, 15  | tile repeat (x, y)   |
/// | 13, 14  | tile skew (x, y)     |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(into = "DecodedRow")]
pub struct ColorTableRow(pub [u16; ROW_LEN]);

const fn h(value: f32) -> u16 {
    f16::from_f32_const(value).to_bits()
}

impl ColorTableRow {
    pub const DEFAULT: Self = Self([
        h(1.0),
        h(1.0),
        h(1.0),
        h(1.0),
        h(1.0),
        h(1.0),
        h(1.0),
        h(20.0),
        h(0.0),
        h(0.0),
        h(0.0),
        h(0.5 / 64.0),
        h(16.0),
        h(0.0),
        h(0.0),
        h(16.0),
    ]);

    fn get(&self, idx: usize) -> f32 {
        f16::from_bits(self.0[idx]).to_f32()
    }

    fn set(&mut self, idx: usize, value: f32) {
        self.0[idx] = f16::from_f32(value).to_bits();
    }

    fn get3(&self, idx: usize) -> Vec3 {
        Vec3::new(self.get(idx), self.get(idx + 1), self.get(idx + 2))
    }

    fn set3(&mut self, idx: usize, value: Vec3) {
        self.set(idx, value.x);
        self.set(idx + 1, value.y);
        self.set(idx + 2, value.z);
    }

    pub fn diffuse(&self) -> Vec3 {
        self.get3(0)
    }

    pub fn set_diffuse(&mut self, value: Vec3) {
        self.set3(0, value)
    }

    pub fn specular_mask(&self) -> f32 {
        self.get(3)
    }

    pub fn set_specular_mask(&mut self, value: f32) {
        self.set(3, value)
    }

    pub fn specular(&self) -> Vec3 {
        self.get3(4)
    }

    pub fn set_specular(&mut self, value: Vec3) {
        self.set3(4, value)
    }

    pub fn shininess(&self) -> f32 {
        self.get(7)
    }

    pub fn set_shininess(&mut self, value: f32) {
        self.set(7, value)
    }

    pub fn emissive(&self) -> Vec3 {
        self.get3(8)
    }

    pub fn set_emissive(&mut self, value: Vec3) {
        self.set3(8, value)
    }

    /// Stored with a half texel bias, see [`ColorTableRow::set_tile_index`].
    pub fn tile_index(&self) -> u16 {
        (self.get(11) * 64.0) as u16
    }

    pub fn set_tile_index(&mut self, value: u16) {
        self.set(11, (value as f32 + 0.5) / 64.0)
    }

    pub fn tile_repeat(&self) -> Vec2 {
        Vec2::new(self.get(12), self.get(15))
    }

    pub fn set_tile_repeat(&mut self, value: Vec2) {
        self.set(12, value.x);
        self.set(15, value.y);
    }

    pub fn tile_skew(&self) -> Vec2 {
        Vec2::new(self.get(13), self.get(14))
    }

    pub fn set_tile_skew(&mut self, value: Vec2) {
        self.set(13, value.x);
        self.set(14, value.y);
    }
}

impl Default for ColorTableRow {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Widened view of a [`ColorTableRow`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DecodedRow {
    pub diffuse: Vec3,
    pub specular_mask: f32,
    pub specular: Vec3,
    pub shininess: f32,
    pub emissive: Vec3,
    pub tile_index: u16,
    pub tile_repeat: Vec2,
    pub tile_skew: Vec2,
}

impl From<ColorTableRow> for DecodedRow {
    fn from(row: ColorTableRow) -> Self {
        Self {
            diffuse: row.diffuse(),
            specular_mask: row.specular_mask(),
            specular: row.specular(),
            shininess: row.shininess(),
            emissive: row.emissive(),
            tile_index: row.tile_index(),
            tile_repeat: row.tile_repeat(),
            tile_skew: row.tile_skew(),
        }
    }
}

/// Row selection for a continuous table index, as computed by the character shader.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TableRow {
    pub stepped: usize,
    pub previous: usize,
    pub next: usize,
    pub weight: f32,
}

impl TableRow {
    pub fn compute(index: f32) -> Self {
        let index = if index.is_nan() {
            0.0
        } else {
            index.clamp(0.0, 1.0)
        };
        let base = index * 15.0;
        let filter = (index * 7.5 % 1.0 * 2.0).floor();
        let smoothed = filter * ((base + 0.5).floor() - base) + base;
        let stepped = (smoothed + 0.5).floor();

        let last = NUM_ROWS - 1;
        Self {
            stepped: (stepped as usize).min(last),
            previous: (smoothed.floor() as usize).min(last),
            next: (smoothed.ceil() as usize).min(last),
            weight: smoothed % 1.0,
        }
    }
}

/// Table values blended between the two rows of a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SampledRow {
    pub diffuse: Vec3,
    pub specular: Vec3,
    pub specular_mask: f32,
    pub emissive: Vec3,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColorTable {
    rows: [ColorTableRow; NUM_ROWS],
}

impl Default for ColorTable {
    fn default() -> Self {
        Self {
            rows: [ColorTableRow::DEFAULT; NUM_ROWS],
        }
    }
}

impl ColorTable {
    pub fn decode(values: &[u16]) -> Result<Self, XivError> {
        if values.len() != NUM_VALUES {
            return Err(XivError::ColorTableLength(values.len()));
        }
        let mut rows = [ColorTableRow::DEFAULT; NUM_ROWS];
        for (row, chunk) in rows.iter_mut().zip(values.chunks_exact(ROW_LEN)) {
            row.0.copy_from_slice(chunk);
        }
        Ok(Self { rows })
    }

    pub fn encode(&self) -> [u16; NUM_VALUES] {
        let mut values = [0u16; NUM_VALUES];
        for (chunk, row) in values.chunks_exact_mut(ROW_LEN).zip(&self.rows) {
            chunk.copy_from_slice(&row.0);
        }
        values
    }

    /// Reads 256 little-endian half floats.
    pub fn from_bytes(data: &[u8]) -> Result<Self, XivError> {
        if data.len() != NUM_BYTES {
            return Err(XivError::ColorTableData {
                needed: NUM_BYTES,
                available: data.len(),
            });
        }
        let values: Vec<u16> = data
            .chunks_exact(2)
            .map(|b| u16::from_le_bytes([b[0], b[1]]))
            .collect();
        Self::decode(&values)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.encode().iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    /// Decodes a color table texture. `stride` is the byte pitch of one texel line.
    pub fn from_texture(
        format: u32,
        width: u32,
        height: u32,
        stride: usize,
        data: &[u8],
    ) -> Result<Self, XivError> {
        if format != R16G16B16A16F {
            return Err(XivError::ColorTableFormat(format));
        }
        let layout = ColorTableLayout::from_dimensions(width, height)?;
        let data = adjust_stride(data, width as usize, height as usize, stride)?;

        let row_bytes = layout.row_len() * 2;
        let mut values = Vec::with_capacity(NUM_VALUES);
        for line in data.chunks_exact(row_bytes).take(NUM_ROWS) {
            values.extend(
                line.chunks_exact(2)
                    .take(ROW_LEN)
                    .map(|b| u16::from_le_bytes([b[0], b[1]])),
            );
        }
        tracing::trace!(?layout, "decoded color table texture");
        Self::decode(&values)
    }

    pub fn rows(&self) -> &[ColorTableRow; NUM_ROWS] {
        &self.rows
    }

    pub fn rows_mut(&mut self) -> &mut [ColorTableRow; NUM_ROWS] {
        &mut self.rows
    }

    /// Previous row, next row and the selection for a continuous index in `[0, 1]`.
    pub fn lookup(&self, index: f32) -> (ColorTableRow, ColorTableRow, TableRow) {
        let row = TableRow::compute(index);
        (self.rows[row.previous], self.rows[row.next], row)
    }

    pub fn sample(&self, index: f32) -> SampledRow {
        let (prev, next, row) = self.lookup(index);
        let w = row.weight;
        SampledRow {
            diffuse: prev.diffuse().lerp(next.diffuse(), w),
            specular: prev.specular().lerp(next.specular(), w),
            specular_mask: prev.specular_mask() * (1.0 - w) + next.specular_mask() * w,
            emissive: prev.emissive().lerp(next.emissive(), w),
        }
    }

    /// Renders the table as a 4x16 image, one texel per four halves.
    /// Values outside `[0, 1]` saturate.
    pub fn to_image(&self) -> image::RgbaImage {
        let mut result = image::RgbaImage::new(4, NUM_ROWS as u32);
        for (y, row) in self.rows.iter().enumerate() {
            for x in 0..4 {
                let px: [u8; 4] = std::array::from_fn(|c| (row.get(x * 4 + c) * 255.0) as u8);
                result.put_pixel(x as u32, y as u32, px.into());
            }
        }
        result
    }
}

/// Drops per-line padding from texture data with a pitch of `stride` bytes.
pub fn adjust_stride(
    data: &[u8],
    width: usize,
    height: usize,
    stride: usize,
) -> Result<Cow<'_, [u8]>, XivError> {
    let line = width * TEXEL_BYTES;
    let needed = if height == 0 {
        0
    } else {
        stride.max(line) * (height - 1) + line
    };
    if stride < line || data.len() < needed {
        return Err(XivError::ColorTableData {
            needed,
            available: data.len(),
        });
    }

    if stride == line {
        return Ok(Cow::Borrowed(&data[..line * height]));
    }

    let mut result = Vec::with_capacity(line * height);
    for y in 0..height {
        result.extend_from_slice(&data[y * stride..y * stride + line]);
    }
    Ok(Cow::Owned(result))
}
