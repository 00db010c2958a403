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

use std::{
    ffi::{c_char, c_void, CString},
    slice,
};

use bytes::Bytes;
#[cfg(unix)]
use libloading::os::unix::Symbol as RawSymbol;
#[cfg(windows)]
use libloading::os::windows::Symbol as RawSymbol;

use crate::{
    loader::{CreateContextFn, ReleaseContextFn, CREATE_CONTEXT_SYMBOL, RELEASE_CONTEXT_SYMBOL,
             RENDER_SYMBOL},
    ChannelOrder, EngineError, EngineLibrary, EngineVariant, GraphInstance, InputValue,
    OutputPayload, OutputUpdate, PixelFormat, RenderEngine, Texture,
};

#[repr(C)]
pub(crate) struct RawTexture {
    data: *const u8,
    width: u16,
    height: u16,
    pixel_format: u8,
    channel_order: u8,
    mip_count: u8,
}

#[repr(C)]
pub(crate) struct RawInput {
    identifier: *const c_char,
    ty: u8,
    floats: [f32; 4],
    ints: [i32; 4],
    string: *const c_char,
    image: *const RawTexture,
}

#[repr(C)]
pub(crate) struct RawOutput {
    output_index: u32,
    kind: u8,
    texture: RawTexture,
    float_value: f32,
    int_value: i32,
}

type OutputSinkFn = unsafe extern "C" fn(user: *mut c_void, output: *const RawOutput);

type RenderGraphFn = unsafe extern "C" fn(
    context: *mut c_void,
    package: *const u8,
    package_len: usize,
    graph_index: u32,
    inputs: *const RawInput,
    input_count: usize,
    sink: OutputSinkFn,
    user: *mut c_void,
) -> u32;

/// Engine backed by a discovered shared library. Owned by exactly one
/// thread; the context never crosses a thread boundary after creation.
pub struct NativeEngine {
    // Field order matters: symbols and the context must drop before the
    // library is unloaded.
    context: *mut c_void,
    render: RawSymbol<RenderGraphFn>,
    release: RawSymbol<ReleaseContextFn>,
    variant: EngineVariant,
    _library: EngineLibrary,
}

// The worker thread creates the engine and is the only caller for its whole
// lifetime, so the raw context pointer is never shared.
unsafe impl Send for NativeEngine {}

impl NativeEngine {
    pub fn new(library: EngineLibrary) -> Result<Self, EngineError> {
        let variant = library.variant();
        unsafe {
            let create: libloading::Symbol<CreateContextFn> = library
                .library
                .get(CREATE_CONTEXT_SYMBOL)
                .map_err(|err| EngineError::Render(err.to_string()))?;
            let release: libloading::Symbol<ReleaseContextFn> = library
                .library
                .get(RELEASE_CONTEXT_SYMBOL)
                .map_err(|err| EngineError::Render(err.to_string()))?;
            let render: libloading::Symbol<RenderGraphFn> = library
                .library
                .get(RENDER_SYMBOL)
                .map_err(|err| EngineError::Render(err.to_string()))?;

            let mut context: *mut c_void = std::ptr::null_mut();
            if create(&mut context) != 0 {
                return Err(EngineError::Render("context creation failed".into()));
            }
            let release = release.into_raw();
            let render = render.into_raw();
            Ok(Self {
                context,
                render,
                release,
                variant,
                _library: library,
            })
        }
    }
}

struct OutputCollector {
    updates: Vec<OutputUpdate>,
}

unsafe extern "C" fn collect_output(user: *mut c_void, output: *const RawOutput) {
    let collector = &mut *(user as *mut OutputCollector);
    let output = &*output;
    let payload = match output.kind {
        1 => OutputPayload::Float(output.float_value),
        2 => OutputPayload::Int(output.int_value),
        _ => {
            let format = PixelFormat::new(output.texture.pixel_format);
            let size = output.texture.width as usize
                * output.texture.height as usize
                * format.bytes_per_pixel();
            let data = slice::from_raw_parts(output.texture.data, size);
            OutputPayload::Image(Texture {
                width: output.texture.width,
                height: output.texture.height,
                format,
                channel_order: ChannelOrder::from_byte(output.texture.channel_order),
                mip_count: output.texture.mip_count,
                data: Bytes::copy_from_slice(data),
            })
        }
    };
    collector.updates.push(OutputUpdate {
        output_index: output.output_index as usize,
        payload,
    });
}

fn raw_input(desc_identifier: &CString, value: &InputValue, scratch: &mut Scratch) -> RawInput {
    let mut raw = RawInput {
        identifier: desc_identifier.as_ptr(),
        ty: value.ty() as u8,
        floats: [0.0; 4],
        ints: [0; 4],
        string: std::ptr::null(),
        image: std::ptr::null(),
    };
    match value {
        InputValue::Float(v) => raw.floats[0] = *v,
        InputValue::Float2(v) => raw.floats[..2].copy_from_slice(v),
        InputValue::Float3(v) => raw.floats[..3].copy_from_slice(v),
        InputValue::Float4(v) => raw.floats.copy_from_slice(v),
        InputValue::Int(v) => raw.ints[0] = *v,
        InputValue::Int2(v) => raw.ints[..2].copy_from_slice(v),
        InputValue::Int3(v) => raw.ints[..3].copy_from_slice(v),
        InputValue::Int4(v) => raw.ints.copy_from_slice(v),
        InputValue::String(v) => {
            scratch.strings.push(CString::new(v.as_str()).unwrap_or_default());
            raw.string = scratch.strings.last().unwrap().as_ptr();
        }
        InputValue::Image(image) => {
            if let Some(image) = image {
                let texture = image.texture();
                // Boxed so the pointer stays valid while the vector grows.
                scratch.textures.push(Box::new(RawTexture {
                    data: texture.data.as_ptr(),
                    width: texture.width,
                    height: texture.height,
                    pixel_format: texture.format.bits(),
                    channel_order: texture.channel_order as u8,
                    mip_count: texture.mip_count,
                }));
                raw.image = scratch.textures.last().unwrap().as_ref();
            }
        }
    }
    raw
}

#[derive(Default)]
struct Scratch {
    strings: Vec<CString>,
    textures: Vec<Box<RawTexture>>,
}

fn apply_shuffle(texture: &mut Texture, shuffle: [usize; 4]) {
    if texture.format.precision() != PixelFormat::PREC_8I
        || texture.format.channel_count() != 4
    {
        return;
    }
    let mut data = texture.data.to_vec();
    for pixel in data.chunks_exact_mut(4) {
        let original = [pixel[0], pixel[1], pixel[2], pixel[3]];
        for (dst, src) in shuffle.iter().enumerate() {
            pixel[dst] = original[*src];
        }
    }
    texture.data = Bytes::from(data);
    texture.channel_order = ChannelOrder::Rgba;
}

impl RenderEngine for NativeEngine {
    fn variant(&self) -> EngineVariant {
        self.variant
    }

    fn render(&mut self, instance: &mut GraphInstance) -> Result<Vec<OutputUpdate>, EngineError> {
        let desc = instance.desc();
        let identifiers: Vec<CString> = desc
            .inputs
            .iter()
            .map(|i| CString::new(i.identifier.as_str()).unwrap_or_default())
            .collect();
        let mut scratch = Scratch::default();
        let inputs: Vec<RawInput> = identifiers
            .iter()
            .enumerate()
            .map(|(index, identifier)| raw_input(identifier, instance.cell(index), &mut scratch))
            .collect();

        let mut collector = OutputCollector {
            updates: Vec::new(),
        };
        let package = instance.package().raw().clone();
        let status = unsafe {
            (*self.render)(
                self.context,
                package.as_ptr(),
                package.len(),
                instance.graph_index() as u32,
                inputs.as_ptr(),
                inputs.len(),
                collect_output,
                &mut collector as *mut OutputCollector as *mut c_void,
            )
        };
        if status != 0 {
            return Err(EngineError::Render(format!("engine status {}", status)));
        }

        // Honor per output channel shuffles requested on the instance.
        for update in &mut collector.updates {
            if let OutputPayload::Image(texture) = &mut update.payload {
                if let Some(shuffle) = instance.output_shuffle(update.output_index) {
                    apply_shuffle(texture, shuffle);
                }
            }
        }
        Ok(collector.updates)
    }
}

impl Drop for NativeEngine {
    fn drop(&mut self) {
        unsafe {
            (*self.release)(self.context);
        }
    }
}
