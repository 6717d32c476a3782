use crate::{
    cursor::BinaryCursor,
    error::{Diagnostic, XivError},
};
use binrw::binread;
use byteorder::{ByteOrder, LE};
use glam::{Vec2, Vec3, Vec4};
use half::f16;
use serde::Serialize;

/// Stream index that terminates a vertex declaration.
pub const END_OF_DECLARATION: u8 = 0xFF;
pub const MAX_STREAMS: usize = 3;

/// Element encodings used by character vertex buffers, named after their DXGI formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum VertexFormat {
    R16G16Snorm,
    R16G16B16A16Snorm,
    R32Float,
    R32G32Float,
    R32G32B32Float,
    R32G32B32A32Float,
    R16G16Float,
    R16G16B16A16Float,
    R8G8B8A8Unorm,
    R16G16Sint,
    R16G16B16A16Sint,
    R8G8B8A8Uint,
}

impl VertexFormat {
    pub fn from_dxgi(code: u8) -> Option<Self> {
        Some(match code {
            18 => Self::R16G16Snorm,
            20 => Self::R16G16B16A16Snorm,
            33 => Self::R32Float,
            34 => Self::R32G32Float,
            35 => Self::R32G32B32Float,
            36 => Self::R32G32B32A32Float,
            50 => Self::R16G16Float,
            52 => Self::R16G16B16A16Float,
            68 => Self::R8G8B8A8Unorm,
            82 => Self::R16G16Sint,
            84 => Self::R16G16B16A16Sint,
            116 => Self::R8G8B8A8Uint,
            _ => return None,
        })
    }

    pub fn dxgi(self) -> u8 {
        match self {
            Self::R16G16Snorm => 18,
            Self::R16G16B16A16Snorm => 20,
            Self::R32Float => 33,
            Self::R32G32Float => 34,
            Self::R32G32B32Float => 35,
            Self::R32G32B32A32Float => 36,
            Self::R16G16Float => 50,
            Self::R16G16B16A16Float => 52,
            Self::R8G8B8A8Unorm => 68,
            Self::R16G16Sint => 82,
            Self::R16G16B16A16Sint => 84,
            Self::R8G8B8A8Uint => 116,
        }
    }

    /// Encoded size in bytes.
    pub fn size(self) -> usize {
        match self {
            Self::R8G8B8A8Unorm | Self::R8G8B8A8Uint => 4,
            Self::R16G16Snorm | Self::R16G16Float | Self::R16G16Sint => 4,
            Self::R32Float => 4,
            Self::R16G16B16A16Snorm | Self::R16G16B16A16Float | Self::R16G16B16A16Sint => 8,
            Self::R32G32Float => 8,
            Self::R32G32B32Float => 12,
            Self::R32G32B32A32Float => 16,
        }
    }
}

/// Render kernel vertex semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum VertexUsage {
    Position,
    BlendWeight,
    Normal,
    Color0,
    Color1,
    Fog,
    PointSize,
    BlendIndices,
    TexCoord(u8),
    Tangent,
    Binormal,
    Depth,
}

impl VertexUsage {
    pub fn from_kernel(code: u8) -> Option<Self> {
        Some(match code {
            0 => Self::Position,
            1 => Self::BlendWeight,
            2 => Self::Normal,
            3 => Self::Color0,
            4 => Self::Color1,
            5 => Self::Fog,
            6 => Self::PointSize,
            7 => Self::BlendIndices,
            8..=13 => Self::TexCoord(code - 8),
            14 => Self::Tangent,
            15 => Self::Binormal,
            16 => Self::Depth,
            _ => return None,
        })
    }

    pub fn kernel(self) -> u8 {
        match self {
            Self::Position => 0,
            Self::BlendWeight => 1,
            Self::Normal => 2,
            Self::Color0 => 3,
            Self::Color1 => 4,
            Self::Fog => 5,
            Self::PointSize => 6,
            Self::BlendIndices => 7,
            Self::TexCoord(n) => 8 + n,
            Self::Tangent => 14,
            Self::Binormal => 15,
            Self::Depth => 16,
        }
    }

    pub fn semantic(self) -> String {
        match self {
            Self::Position => "POSITION0".into(),
            Self::BlendWeight => "BLENDWEIGHT0".into(),
            Self::Normal => "NORMAL0".into(),
            Self::Color0 => "COLOR0".into(),
            Self::Color1 => "COLOR1".into(),
            Self::Fog => "FOG0".into(),
            Self::PointSize => "PSIZE0".into(),
            Self::BlendIndices => "BLENDINDICES0".into(),
            Self::TexCoord(n) => format!("TEXCOORD{n}"),
            Self::Tangent => "TANGENT0".into(),
            Self::Binormal => "BINORMAL0".into(),
            Self::Depth => "DEPTH0".into(),
        }
    }
}

/// Vertex declaration entry as laid out by the render kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[binread]
#[br(little)]
pub struct RawVertexElement {
    pub stream: u8,
    pub offset: u8,
    pub format: u8,
    pub usage: u8,
    #[br(pad_after = 3)]
    pub usage_index: u8,
}

impl RawVertexElement {
    pub fn new(stream: u8, offset: u8, format: u8, usage: u8) -> Self {
        Self {
            stream,
            offset,
            format,
            usage,
            usage_index: 0,
        }
    }

    pub fn is_terminator(&self) -> bool {
        self.stream == END_OF_DECLARATION
    }

    pub fn resolve(&self) -> Result<VertexElement, Diagnostic> {
        let format = VertexFormat::from_dxgi(self.format).ok_or(Diagnostic::UnknownVertexFormat {
            usage: self.usage,
            format: self.format,
        })?;
        let usage = VertexUsage::from_kernel(self.usage).ok_or(Diagnostic::UnknownVertexUsage {
            usage: self.usage,
            format: self.format,
        })?;
        Ok(VertexElement {
            stream: self.stream,
            offset: self.offset,
            format,
            usage,
        })
    }
}

/// Reads 8 byte declaration entries up to the first terminator.
pub fn parse_declaration(data: &[u8]) -> Result<Vec<RawVertexElement>, XivError> {
    let mut r = BinaryCursor::new(data);
    let mut elements = Vec::new();
    while r.remaining() > 0 {
        let element: RawVertexElement = r.read()?;
        if element.is_terminator() {
            break;
        }
        elements.push(element);
    }
    Ok(elements)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VertexElement {
    pub stream: u8,
    pub offset: u8,
    pub format: VertexFormat,
    pub usage: VertexUsage,
}

/// One decoded element before it is fitted to its vertex slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ElementValue {
    Scalar(f32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
}

impl ElementValue {
    pub fn to_vec3(self) -> Vec3 {
        match self {
            Self::Scalar(x) => Vec3::new(x, 0.0, 0.0),
            Self::Vec2(v) => v.extend(0.0),
            Self::Vec3(v) => v,
            Self::Vec4(v) => v.truncate(),
        }
    }

    pub fn to_vec4(self) -> Vec4 {
        match self {
            Self::Scalar(x) => Vec4::new(x, 0.0, 0.0, 0.0),
            Self::Vec2(v) => v.extend(0.0).extend(0.0),
            Self::Vec3(v) => v.extend(0.0),
            Self::Vec4(v) => v,
        }
    }
}

fn snorm(value: i16) -> f32 {
    if value == i16::MIN {
        -1.0
    } else {
        value as f32 / 32767.0
    }
}

fn unorm(value: u8) -> f32 {
    value as f32 / 255.0
}

fn read_half(b: &[u8]) -> f32 {
    f16::from_bits(LE::read_u16(b)).to_f32()
}

/// Decodes one element. `b` must hold at least `format.size()` bytes.
pub fn decode_element(b: &[u8], format: VertexFormat) -> ElementValue {
    let s = |i: usize| LE::read_i16(&b[i * 2..]);
    let f = |i: usize| LE::read_f32(&b[i * 4..]);
    let h = |i: usize| read_half(&b[i * 2..]);

    match format {
        VertexFormat::R16G16Snorm => ElementValue::Vec2(Vec2::new(snorm(s(0)), snorm(s(1)))),
        VertexFormat::R16G16B16A16Snorm => ElementValue::Vec4(Vec4::new(
            snorm(s(0)),
            snorm(s(1)),
            snorm(s(2)),
            snorm(s(3)),
        )),
        VertexFormat::R32Float => ElementValue::Scalar(f(0)),
        VertexFormat::R32G32Float => ElementValue::Vec2(Vec2::new(f(0), f(1))),
        VertexFormat::R32G32B32Float => ElementValue::Vec3(Vec3::new(f(0), f(1), f(2))),
        VertexFormat::R32G32B32A32Float => ElementValue::Vec4(Vec4::new(f(0), f(1), f(2), f(3))),
        VertexFormat::R16G16Float => ElementValue::Vec2(Vec2::new(h(0), h(1))),
        VertexFormat::R16G16B16A16Float => ElementValue::Vec4(Vec4::new(h(0), h(1), h(2), h(3))),
        VertexFormat::R8G8B8A8Unorm => ElementValue::Vec4(Vec4::new(
            unorm(b[0]),
            unorm(b[1]),
            unorm(b[2]),
            unorm(b[3]),
        )),
        VertexFormat::R16G16Sint => ElementValue::Vec2(Vec2::new(s(0) as f32, s(1) as f32)),
        VertexFormat::R16G16B16A16Sint => ElementValue::Vec4(Vec4::new(
            s(0) as f32,
            s(1) as f32,
            s(2) as f32,
            s(3) as f32,
        )),
        VertexFormat::R8G8B8A8Uint => {
            ElementValue::Vec4(Vec4::new(b[0] as f32, b[1] as f32, b[2] as f32, b[3] as f32))
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Vertex {
    pub position: Option<Vec4>,
    pub blend_weights: Option<Vec4>,
    pub blend_indices: Option<[u8; 4]>,
    pub normal: Option<Vec3>,
    pub uv: Option<Vec4>,
    pub color: Option<Vec4>,
    pub tangent1: Option<Vec4>,
    pub tangent2: Option<Vec4>,
}

impl Vertex {
    /// `(blend index, weight)` pairs with a non-zero weight.
    pub fn joints(&self) -> Vec<(u8, f32)> {
        match (self.blend_indices, self.blend_weights) {
            (Some(indices), Some(weights)) => indices
                .iter()
                .zip(weights.to_array())
                .filter(|(_, w)| *w != 0.0)
                .map(|(i, w)| (*i, w))
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Slot a usage is written to, `None` for usages the canonical vertex has no room for.
fn route(usage: VertexUsage) -> Option<fn(&mut Vertex, ElementValue)> {
    let write: fn(&mut Vertex, ElementValue) = match usage {
        VertexUsage::Position => |v, e| v.position = Some(e.to_vec4()),
        VertexUsage::BlendWeight => |v, e| v.blend_weights = Some(e.to_vec4()),
        VertexUsage::BlendIndices => |v, e| {
            let e = e.to_vec4();
            v.blend_indices = Some([e.x as u8, e.y as u8, e.z as u8, e.w as u8]);
        },
        VertexUsage::Normal => |v, e| v.normal = Some(e.to_vec3()),
        VertexUsage::TexCoord(0) => |v, e| v.uv = Some(e.to_vec4()),
        VertexUsage::Color0 => |v, e| v.color = Some(e.to_vec4()),
        VertexUsage::Tangent => |v, e| v.tangent2 = Some(e.to_vec4()),
        VertexUsage::Binormal => |v, e| v.tangent1 = Some(e.to_vec4()),
        _ => return None,
    };
    Some(write)
}

/// Decodes `element` for every vertex from a stream with `stride` bytes per vertex.
///
/// Usages without a vertex slot leave the vertices untouched and come back as a diagnostic.
pub fn apply(
    vertices: &mut [Vertex],
    stream: &[u8],
    element: &VertexElement,
    stride: usize,
) -> Result<Option<Diagnostic>, XivError> {
    let Some(write) = route(element.usage) else {
        tracing::debug!(usage = %element.usage.semantic(), format = ?element.format, "skipped vertex element");
        return Ok(Some(Diagnostic::UnroutedVertexUsage {
            usage: element.usage.semantic().into_boxed_str(),
        }));
    };

    let offset = element.offset as usize;
    let size = element.format.size();
    if offset + size > stride {
        return Err(XivError::VertexElementStride {
            offset,
            size,
            stride,
        });
    }

    let needed = vertices.len() * stride;
    if stream.len() < needed {
        return Err(XivError::VertexStream {
            needed,
            available: stream.len(),
        });
    }

    for (vertex, chunk) in vertices.iter_mut().zip(stream.chunks_exact(stride)) {
        write(vertex, decode_element(&chunk[offset..], element.format));
    }
    Ok(None)
}

/// Decodes a full declaration into `vertex_count` vertices.
pub fn decode_vertices(
    vertex_count: usize,
    streams: &[&[u8]; MAX_STREAMS],
    strides: &[u8; MAX_STREAMS],
    declaration: &[RawVertexElement],
) -> Result<(Vec<Vertex>, Vec<Diagnostic>), XivError> {
    let mut vertices = vec![Vertex::default(); vertex_count];
    let mut diagnostics = Vec::new();

    for raw in declaration.iter().take_while(|e| !e.is_terminator()) {
        let element = match raw.resolve() {
            Ok(element) => element,
            Err(diagnostic) => {
                tracing::debug!(%diagnostic, "skipped vertex element");
                diagnostics.push(diagnostic);
                continue;
            }
        };

        let stream = element.stream as usize;
        if stream >= MAX_STREAMS {
            return Err(XivError::VertexStreamIndex(element.stream));
        }

        if let Some(diagnostic) = apply(
            &mut vertices,
            streams[stream],
            &element,
            strides[stream] as usize,
        )? {
            diagnostics.push(diagnostic);
        }
    }

    Ok((vertices, diagnostics))
}
