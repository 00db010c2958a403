// Copyright (C) 2025 gigablaster

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

use std::io::{self, Cursor, Read, Write};

use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use bytes::Bytes;
use four_cc::FourCC;

use crate::{EngineError, InputDesc, InputType, InputValue, InputWidget, PixelFormat};

const MAGICK: FourCC = FourCC(*b"UPKG");
const VERSION: u32 = 1;

/// Numeric outputs the engine can produce. There is no bool output type;
/// toggles come back as integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericKind {
    Float,
    Int,
}

/// Description of one graph output and the usage tags it serves.
#[derive(Debug, Clone)]
pub struct OutputDesc {
    pub identifier: String,
    pub usages: Vec<String>,
    pub format: PixelFormat,
    pub numeric: Option<NumericKind>,
}

#[derive(Debug, Clone)]
pub struct PresetDesc {
    pub label: String,
    pub values_json: String,
}

/// One named pipeline inside a package.
#[derive(Debug)]
pub struct GraphDesc {
    pub label: String,
    pub category: String,
    pub thumbnail: Bytes,
    pub inputs: Vec<InputDesc>,
    pub outputs: Vec<OutputDesc>,
    pub presets: Vec<PresetDesc>,
}

impl GraphDesc {
    pub fn has_thumbnail(&self) -> bool {
        !self.thumbnail.is_empty()
    }
}

/// Immutable description of a procedural package. The raw bytes stay around
/// because the compute engine consumes the archive itself.
#[derive(Debug)]
pub struct PackageDesc {
    raw: Bytes,
    graphs: Vec<GraphDesc>,
}

impl PackageDesc {
    pub fn read(raw: Bytes) -> Result<Self, EngineError> {
        let graphs = parse_package(&mut Cursor::new(raw.as_ref()))
            .map_err(|err| EngineError::InvalidPackage(err.to_string()))?;
        Ok(Self { raw, graphs })
    }

    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    pub fn graphs(&self) -> &[GraphDesc] {
        &self.graphs
    }

    pub fn graph(&self, index: usize) -> &GraphDesc {
        &self.graphs[index]
    }
}

fn read_string(r: &mut impl Read) -> io::Result<String> {
    let len = r.read_u16::<LE>()? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "bad utf8"))
}

fn write_string(w: &mut impl Write, s: &str) -> io::Result<()> {
    w.write_u16::<LE>(s.len() as u16)?;
    w.write_all(s.as_bytes())
}

fn read_default(r: &mut impl Read, ty: InputType) -> io::Result<InputValue> {
    let value = match ty {
        InputType::Float => InputValue::Float(r.read_f32::<LE>()?),
        InputType::Float2 => InputValue::Float2([r.read_f32::<LE>()?, r.read_f32::<LE>()?]),
        InputType::Float3 => InputValue::Float3([
            r.read_f32::<LE>()?,
            r.read_f32::<LE>()?,
            r.read_f32::<LE>()?,
        ]),
        InputType::Float4 => InputValue::Float4([
            r.read_f32::<LE>()?,
            r.read_f32::<LE>()?,
            r.read_f32::<LE>()?,
            r.read_f32::<LE>()?,
        ]),
        InputType::Int => InputValue::Int(r.read_i32::<LE>()?),
        InputType::Int2 => InputValue::Int2([r.read_i32::<LE>()?, r.read_i32::<LE>()?]),
        InputType::Int3 => InputValue::Int3([
            r.read_i32::<LE>()?,
            r.read_i32::<LE>()?,
            r.read_i32::<LE>()?,
        ]),
        InputType::Int4 => InputValue::Int4([
            r.read_i32::<LE>()?,
            r.read_i32::<LE>()?,
            r.read_i32::<LE>()?,
            r.read_i32::<LE>()?,
        ]),
        InputType::String => InputValue::String(read_string(r)?),
        InputType::Image => InputValue::Image(None),
    };
    Ok(value)
}

fn write_default(w: &mut impl Write, value: &InputValue) -> io::Result<()> {
    match value {
        InputValue::Float(v) => w.write_f32::<LE>(*v)?,
        InputValue::Float2(v) => v.iter().try_for_each(|v| w.write_f32::<LE>(*v))?,
        InputValue::Float3(v) => v.iter().try_for_each(|v| w.write_f32::<LE>(*v))?,
        InputValue::Float4(v) => v.iter().try_for_each(|v| w.write_f32::<LE>(*v))?,
        InputValue::Int(v) => w.write_i32::<LE>(*v)?,
        InputValue::Int2(v) => v.iter().try_for_each(|v| w.write_i32::<LE>(*v))?,
        InputValue::Int3(v) => v.iter().try_for_each(|v| w.write_i32::<LE>(*v))?,
        InputValue::Int4(v) => v.iter().try_for_each(|v| w.write_i32::<LE>(*v))?,
        InputValue::String(v) => write_string(w, v)?,
        InputValue::Image(_) => {}
    }
    Ok(())
}

fn parse_input(r: &mut impl Read) -> io::Result<InputDesc> {
    let identifier = read_string(r)?;
    let label = read_string(r)?;
    let group = read_string(r)?;
    let ty = InputType::from_byte(r.read_u8()?)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "bad input type"))?;
    let widget = InputWidget::from_byte(r.read_u8()?);
    let default = read_default(r, ty)?;
    let min = match r.read_u8()? {
        0 => None,
        _ => Some(r.read_f32::<LE>()?),
    };
    let max = match r.read_u8()? {
        0 => None,
        _ => Some(r.read_f32::<LE>()?),
    };
    Ok(InputDesc {
        identifier,
        label,
        group,
        ty,
        widget,
        default,
        min,
        max,
    })
}

fn parse_output(r: &mut impl Read) -> io::Result<OutputDesc> {
    let identifier = read_string(r)?;
    let usage_count = r.read_u8()? as usize;
    let mut usages = Vec::with_capacity(usage_count);
    for _ in 0..usage_count {
        usages.push(read_string(r)?);
    }
    let (numeric, format) = match r.read_u8()? {
        0 => (None, PixelFormat::new(r.read_u8()?)),
        1 => (Some(NumericKind::Float), PixelFormat::default()),
        2 => (Some(NumericKind::Int), PixelFormat::default()),
        _ => return Err(io::Error::new(io::ErrorKind::InvalidData, "bad output kind")),
    };
    Ok(OutputDesc {
        identifier,
        usages,
        format,
        numeric,
    })
}

fn parse_package(r: &mut impl Read) -> io::Result<Vec<GraphDesc>> {
    let mut magic = [0u8; 4];
    r.read_exact(&mut magic)?;
    if FourCC(magic) != MAGICK {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "bad magic"));
    }
    if r.read_u32::<LE>()? != VERSION {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "bad version"));
    }
    let graph_count = r.read_u16::<LE>()? as usize;
    let mut graphs = Vec::with_capacity(graph_count);
    for _ in 0..graph_count {
        let label = read_string(r)?;
        let category = read_string(r)?;
        let thumbnail_len = r.read_u32::<LE>()? as usize;
        let mut thumbnail = vec![0u8; thumbnail_len];
        r.read_exact(&mut thumbnail)?;
        let input_count = r.read_u16::<LE>()? as usize;
        let mut inputs = Vec::with_capacity(input_count);
        for _ in 0..input_count {
            inputs.push(parse_input(r)?);
        }
        let output_count = r.read_u16::<LE>()? as usize;
        let mut outputs = Vec::with_capacity(output_count);
        for _ in 0..output_count {
            outputs.push(parse_output(r)?);
        }
        let preset_count = r.read_u16::<LE>()? as usize;
        let mut presets = Vec::with_capacity(preset_count);
        for _ in 0..preset_count {
            presets.push(PresetDesc {
                label: read_string(r)?,
                values_json: read_string(r)?,
            });
        }
        graphs.push(GraphDesc {
            label,
            category,
            thumbnail: Bytes::from(thumbnail),
            inputs,
            outputs,
            presets,
        });
    }
    Ok(graphs)
}

/// Writes the package container. Used by the authoring tools and by tests
/// that need packages without shipping binary fixtures.
#[derive(Default)]
pub struct PackageBuilder {
    graphs: Vec<GraphDesc>,
}

impl PackageBuilder {
    pub fn graph(mut self, graph: GraphDesc) -> Self {
        self.graphs.push(graph);
        self
    }

    pub fn build(self) -> Bytes {
        let mut out = Vec::new();
        out.extend_from_slice(&MAGICK.0);
        out.write_u32::<LE>(VERSION).unwrap();
        out.write_u16::<LE>(self.graphs.len() as u16).unwrap();
        for graph in &self.graphs {
            write_string(&mut out, &graph.label).unwrap();
            write_string(&mut out, &graph.category).unwrap();
            out.write_u32::<LE>(graph.thumbnail.len() as u32).unwrap();
            out.extend_from_slice(&graph.thumbnail);
            out.write_u16::<LE>(graph.inputs.len() as u16).unwrap();
            for input in &graph.inputs {
                write_string(&mut out, &input.identifier).unwrap();
                write_string(&mut out, &input.label).unwrap();
                write_string(&mut out, &input.group).unwrap();
                out.write_u8(input.ty as u8).unwrap();
                out.write_u8(input.widget as u8).unwrap();
                write_default(&mut out, &input.default).unwrap();
                match input.min {
                    Some(v) => {
                        out.write_u8(1).unwrap();
                        out.write_f32::<LE>(v).unwrap();
                    }
                    None => out.write_u8(0).unwrap(),
                }
                match input.max {
                    Some(v) => {
                        out.write_u8(1).unwrap();
                        out.write_f32::<LE>(v).unwrap();
                    }
                    None => out.write_u8(0).unwrap(),
                }
            }
            out.write_u16::<LE>(graph.outputs.len() as u16).unwrap();
            for output in &graph.outputs {
                write_string(&mut out, &output.identifier).unwrap();
                out.write_u8(output.usages.len() as u8).unwrap();
                for usage in &output.usages {
                    write_string(&mut out, usage).unwrap();
                }
                match output.numeric {
                    None => {
                        out.write_u8(0).unwrap();
                        out.write_u8(output.format.bits()).unwrap();
                    }
                    Some(NumericKind::Float) => out.write_u8(1).unwrap(),
                    Some(NumericKind::Int) => out.write_u8(2).unwrap(),
                }
            }
            out.write_u16::<LE>(graph.presets.len() as u16).unwrap();
            for preset in &graph.presets {
                write_string(&mut out, &preset.label).unwrap();
                write_string(&mut out, &preset.values_json).unwrap();
            }
        }
        Bytes::from(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_graph() -> GraphDesc {
        GraphDesc {
            label: "Wood".into(),
            category: "Materials/Wood".into(),
            thumbnail: Bytes::from_static(b"png-bytes"),
            inputs: vec![InputDesc {
                identifier: "tearing".into(),
                label: "Tearing".into(),
                group: "Look".into(),
                ty: InputType::Float,
                widget: InputWidget::Slider,
                default: InputValue::Float(0.5),
                min: Some(0.0),
                max: Some(1.0),
            }],
            outputs: vec![OutputDesc {
                identifier: "basecolor".into(),
                usages: vec!["baseColor".into()],
                format: PixelFormat::default(),
                numeric: None,
            }],
            presets: vec![PresetDesc {
                label: "worn".into(),
                values_json: r#"{"tearing":1.0}"#.into(),
            }],
        }
    }

    #[test]
    fn container_round_trip() {
        let bytes = PackageBuilder::default().graph(sample_graph()).build();
        let package = PackageDesc::read(bytes.clone()).unwrap();
        assert_eq!(package.raw(), &bytes);
        assert_eq!(package.graphs().len(), 1);
        let graph = package.graph(0);
        assert_eq!(graph.label, "Wood");
        assert!(graph.has_thumbnail());
        assert_eq!(graph.inputs[0].identifier, "tearing");
        assert_eq!(graph.inputs[0].max, Some(1.0));
        assert_eq!(graph.outputs[0].usages, vec!["baseColor".to_owned()]);
        assert_eq!(graph.presets[0].label, "worn");
    }

    #[test]
    fn rejects_garbage() {
        assert!(PackageDesc::read(Bytes::from_static(b"not a package")).is_err());
        assert!(PackageDesc::read(Bytes::new()).is_err());
    }
}
