//! Effect resource metadata: shader sources, SPIR-V blobs and the
//! reflection tables describing uniform and attribute inputs.
//!
//! The payload blob is laid out as
//! `[vert_spirv][frag_spirv][geom_spirv][vert_glsl\0][frag_glsl\0][geom_glsl\0]`
//! with NUL-terminated GLSL so the boundaries double as C strings. The
//! metadata stores the seven byte offsets delimiting these sections.

use crate::codec::{BinaryInputStream, BinaryOutputStream};
use crate::errors::{MirageError, Result};
use crate::resources::formats::{DRAW_MODE_NONE, DataType, DrawMode, FixedSemantics};

/// Index into [`EffectMetadata::byte_offsets`].
#[repr(usize)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectOffset {
    VertexSpirv = 0,
    FragmentSpirv,
    GeometrySpirv,
    VertexShader,
    FragmentShader,
    GeometryShader,
    EndOfData,
}

pub const EFFECT_OFFSET_COUNT: usize = 7;

/// Reflection entry for one uniform or attribute input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectInput {
    pub name: String,
    pub element_count: u32,
    pub data_type: DataType,
    pub semantics: FixedSemantics,
    pub uniform_buffer_binding: u32,
    pub ubo_element_size: u32,
    pub ubo_field_offset: u32,
}

impl EffectInput {
    #[must_use]
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            element_count: 1,
            data_type,
            semantics: FixedSemantics::Invalid,
            uniform_buffer_binding: 0,
            ubo_element_size: 0,
            ubo_field_offset: 0,
        }
    }
}

/// Metadata of an effect resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectMetadata {
    pub uniform_inputs: Vec<EffectInput>,
    pub attribute_inputs: Vec<EffectInput>,
    pub byte_offsets: [u32; EFFECT_OFFSET_COUNT],
    pub geometry_input: Option<DrawMode>,
}

impl EffectMetadata {
    /// Builds the payload blob and the matching offsets from shader sources.
    ///
    /// `geometry_input` must be present exactly when a geometry shader is.
    pub fn build_payload(
        vertex_src: &str,
        fragment_src: &str,
        geometry_src: &str,
        vertex_spirv: &[u8],
        fragment_spirv: &[u8],
        geometry_spirv: &[u8],
    ) -> ([u32; EFFECT_OFFSET_COUNT], Vec<u8>) {
        let mut offsets = [0_u32; EFFECT_OFFSET_COUNT];
        offsets[EffectOffset::VertexSpirv as usize] = 0;
        offsets[EffectOffset::FragmentSpirv as usize] = vertex_spirv.len() as u32;
        offsets[EffectOffset::GeometrySpirv as usize] =
            offsets[EffectOffset::FragmentSpirv as usize] + fragment_spirv.len() as u32;
        offsets[EffectOffset::VertexShader as usize] =
            offsets[EffectOffset::GeometrySpirv as usize] + geometry_spirv.len() as u32;
        offsets[EffectOffset::FragmentShader as usize] =
            offsets[EffectOffset::VertexShader as usize] + vertex_src.len() as u32 + 1;
        offsets[EffectOffset::GeometryShader as usize] =
            offsets[EffectOffset::FragmentShader as usize] + fragment_src.len() as u32 + 1;
        offsets[EffectOffset::EndOfData as usize] =
            offsets[EffectOffset::GeometryShader as usize] + geometry_src.len() as u32 + 1;

        let mut payload = Vec::with_capacity(offsets[EffectOffset::EndOfData as usize] as usize);
        payload.extend_from_slice(vertex_spirv);
        payload.extend_from_slice(fragment_spirv);
        payload.extend_from_slice(geometry_spirv);
        payload.extend_from_slice(vertex_src.as_bytes());
        payload.push(0);
        payload.extend_from_slice(fragment_src.as_bytes());
        payload.push(0);
        payload.extend_from_slice(geometry_src.as_bytes());
        payload.push(0);
        (offsets, payload)
    }

    fn section(&self, from: EffectOffset, to: EffectOffset) -> (usize, usize) {
        (
            self.byte_offsets[from as usize] as usize,
            self.byte_offsets[to as usize] as usize,
        )
    }

    /// GLSL vertex source slice of `payload` (without the NUL terminator).
    #[must_use]
    pub fn vertex_shader<'a>(&self, payload: &'a [u8]) -> &'a [u8] {
        let (start, end) = self.section(EffectOffset::VertexShader, EffectOffset::FragmentShader);
        &payload[start..end - 1]
    }

    #[must_use]
    pub fn fragment_shader<'a>(&self, payload: &'a [u8]) -> &'a [u8] {
        let (start, end) = self.section(EffectOffset::FragmentShader, EffectOffset::GeometryShader);
        &payload[start..end - 1]
    }

    #[must_use]
    pub fn geometry_shader<'a>(&self, payload: &'a [u8]) -> &'a [u8] {
        let (start, end) = self.section(EffectOffset::GeometryShader, EffectOffset::EndOfData);
        &payload[start..end - 1]
    }

    #[must_use]
    pub fn vertex_spirv<'a>(&self, payload: &'a [u8]) -> &'a [u8] {
        let (start, end) = self.section(EffectOffset::VertexSpirv, EffectOffset::FragmentSpirv);
        &payload[start..end]
    }

    #[must_use]
    pub fn fragment_spirv<'a>(&self, payload: &'a [u8]) -> &'a [u8] {
        let (start, end) = self.section(EffectOffset::FragmentSpirv, EffectOffset::GeometrySpirv);
        &payload[start..end]
    }

    #[must_use]
    pub fn geometry_spirv<'a>(&self, payload: &'a [u8]) -> &'a [u8] {
        let (start, end) = self.section(EffectOffset::GeometrySpirv, EffectOffset::VertexShader);
        &payload[start..end]
    }

    /// Index of a uniform input by name.
    #[must_use]
    pub fn uniform_input_index(&self, name: &str) -> Option<usize> {
        self.uniform_inputs.iter().position(|i| i.name == name)
    }

    /// Index of an attribute input by name.
    #[must_use]
    pub fn attribute_input_index(&self, name: &str) -> Option<usize> {
        self.attribute_inputs.iter().position(|i| i.name == name)
    }

    pub fn validate(&self, name: &str) -> Result<()> {
        let has_geometry = {
            let (start, end) = self.section(EffectOffset::GeometryShader, EffectOffset::EndOfData);
            end - start > 1
        };
        if has_geometry != self.geometry_input.is_some() {
            return Err(MirageError::InvalidResource {
                name: name.to_string(),
                reason: "geometry shader and geometry input primitive must come together".into(),
            });
        }
        let mut previous = 0;
        for &offset in &self.byte_offsets {
            if offset < previous {
                return Err(MirageError::InvalidResource {
                    name: name.to_string(),
                    reason: "effect byte offsets must be non-decreasing".into(),
                });
            }
            previous = offset;
        }
        Ok(())
    }

    pub(crate) fn serialize(&self, output: &mut BinaryOutputStream) {
        write_input_vector(output, &self.uniform_inputs);
        write_input_vector(output, &self.attribute_inputs);
        for &offset in &self.byte_offsets {
            output.write_u32(offset);
        }
        match self.geometry_input {
            Some(mode) => output.write_u8(mode as u8),
            None => output.write_u8(DRAW_MODE_NONE),
        }
    }

    pub(crate) fn deserialize(input: &mut BinaryInputStream<'_>) -> Result<Self> {
        let uniform_inputs = read_input_vector(input)?;
        let attribute_inputs = read_input_vector(input)?;
        let mut byte_offsets = [0_u32; EFFECT_OFFSET_COUNT];
        for offset in &mut byte_offsets {
            *offset = input.read_u32()?;
        }
        let geometry_input = match input.read_u8()? {
            DRAW_MODE_NONE => None,
            value => Some(DrawMode::from_u8(value)?),
        };
        Ok(Self {
            uniform_inputs,
            attribute_inputs,
            byte_offsets,
            geometry_input,
        })
    }
}

fn write_input_vector(output: &mut BinaryOutputStream, inputs: &[EffectInput]) {
    output.write_u32(inputs.len() as u32);
    for input in inputs {
        output.write_string(&input.name);
        output.write_u32(input.element_count);
        output.write_u32(input.data_type as u32);
        output.write_u32(input.semantics as u32);
        output.write_u32(input.uniform_buffer_binding);
        output.write_u32(input.ubo_element_size);
        output.write_u32(input.ubo_field_offset);
    }
}

fn read_input_vector(input: &mut BinaryInputStream<'_>) -> Result<Vec<EffectInput>> {
    let count = input.read_u32()?;
    let mut inputs = Vec::with_capacity(count.min(1024) as usize);
    for _ in 0..count {
        let name = input.read_string()?;
        let element_count = input.read_u32()?;
        let data_type = DataType::from_u32(input.read_u32()?)?;
        let semantics = FixedSemantics::from_u32(input.read_u32()?)?;
        let uniform_buffer_binding = input.read_u32()?;
        let ubo_element_size = input.read_u32()?;
        let ubo_field_offset = input.read_u32()?;
        inputs.push(EffectInput {
            name,
            element_count,
            data_type,
            semantics,
            uniform_buffer_binding,
            ubo_element_size,
            ubo_field_offset,
        });
    }
    Ok(inputs)
}
