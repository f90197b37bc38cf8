//! Tiny hand-assembled SPIR-V modules: one entry point whose body
//! returns immediately.
use std::sync::Arc;

use ash::vk;

use crate::*;

pub const SPIRV_MAGIC: u32 = 0x0723_0203;

const OP_EXTENSION: u32 = 10;
const OP_CAPABILITY: u32 = 17;
const OP_MEMORY_MODEL: u32 = 14;
const OP_ENTRY_POINT: u32 = 15;
const OP_EXECUTION_MODE: u32 = 16;
const OP_TYPE_VOID: u32 = 19;
const OP_TYPE_FUNCTION: u32 = 33;
const OP_FUNCTION: u32 = 54;
const OP_LABEL: u32 = 248;
const OP_RETURN: u32 = 253;
const OP_FUNCTION_END: u32 = 56;

const CAPABILITY_SHADER: u32 = 1;
const CAPABILITY_RAY_TRACING: u32 = 4479;
const ADDRESSING_LOGICAL: u32 = 0;
const MEMORY_MODEL_GLSL450: u32 = 1;
const MODE_ORIGIN_UPPER_LEFT: u32 = 7;
const MODE_LOCAL_SIZE: u32 = 17;
// Ray tracing execution models are numbered from here up.
const MODEL_RAYGEN: u32 = 5313;

// Result ids
const VOID: u32 = 1;
const FN_TYPE: u32 = 2;
const MAIN: u32 = 3;
const LABEL: u32 = 4;
const BOUND: u32 = 5;

fn op(opcode: u32, operands: &[u32]) -> impl Iterator<Item = u32> + '_ {
    let count = operands.len() as u32 + 1;
    std::iter::once((count << 16) | opcode).chain(operands.iter().copied())
}

/// Encodes a literal string as NUL-terminated little-endian words.
fn string_words(s: &str) -> Vec<u32> {
    let mut bytes = s.as_bytes().to_vec();
    bytes.push(0);
    while bytes.len() % 4 != 0 {
        bytes.push(0);
    }
    bytes.chunks(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// The SPIR-V execution model of a single shader stage.
pub(crate) fn execution_model(stage: vk::ShaderStageFlags) -> Option<u32> {
    Some(match stage {
        vk::ShaderStageFlags::VERTEX => 0,
        vk::ShaderStageFlags::TESSELLATION_CONTROL => 1,
        vk::ShaderStageFlags::TESSELLATION_EVALUATION => 2,
        vk::ShaderStageFlags::GEOMETRY => 3,
        vk::ShaderStageFlags::FRAGMENT => 4,
        vk::ShaderStageFlags::COMPUTE => 5,
        vk::ShaderStageFlags::RAYGEN_KHR => MODEL_RAYGEN,
        vk::ShaderStageFlags::INTERSECTION_KHR => 5314,
        vk::ShaderStageFlags::ANY_HIT_KHR => 5315,
        vk::ShaderStageFlags::CLOSEST_HIT_KHR => 5316,
        vk::ShaderStageFlags::MISS_KHR => 5317,
        vk::ShaderStageFlags::CALLABLE_KHR => 5318,
        _ => return None,
    })
}

/// Assembles a module with a single entry point `entry` for `stage`.
/// Panics if `stage` is not a single shader stage.
pub fn minimal_spirv(stage: vk::ShaderStageFlags, entry: &str) -> Vec<u32> {
    let model = execution_model(stage)
        .unwrap_or_else(|| panic!("unsupported stage: {:?}", stage));

    let mut words = vec![SPIRV_MAGIC, 0x0001_0000, 0, BOUND, 0];
    words.extend(op(OP_CAPABILITY, &[CAPABILITY_SHADER]));
    if model >= MODEL_RAYGEN {
        words.extend(op(OP_CAPABILITY, &[CAPABILITY_RAY_TRACING]));
        words.extend(op(OP_EXTENSION, &string_words("SPV_KHR_ray_tracing")));
    }
    words.extend(op(OP_MEMORY_MODEL,
        &[ADDRESSING_LOGICAL, MEMORY_MODEL_GLSL450]));

    let mut entry_point = vec![model, MAIN];
    entry_point.extend(string_words(entry));
    words.extend(op(OP_ENTRY_POINT, &entry_point));
    match stage {
        vk::ShaderStageFlags::FRAGMENT => words.extend(
            op(OP_EXECUTION_MODE, &[MAIN, MODE_ORIGIN_UPPER_LEFT])),
        vk::ShaderStageFlags::COMPUTE => words.extend(
            op(OP_EXECUTION_MODE, &[MAIN, MODE_LOCAL_SIZE, 1, 1, 1])),
        _ => {},
    }

    words.extend(op(OP_TYPE_VOID, &[VOID]));
    words.extend(op(OP_TYPE_FUNCTION, &[FN_TYPE, VOID]));
    words.extend(op(OP_FUNCTION, &[VOID, MAIN, 0, FN_TYPE]));
    words.extend(op(OP_LABEL, &[LABEL]));
    words.extend(op(OP_RETURN, &[]));
    words.extend(op(OP_FUNCTION_END, &[]));
    words
}

pub fn vertex_spirv() -> Vec<u32> {
    minimal_spirv(vk::ShaderStageFlags::VERTEX, "main")
}

pub fn fragment_spirv() -> Vec<u32> {
    minimal_spirv(vk::ShaderStageFlags::FRAGMENT, "main")
}

pub fn compute_spirv() -> Vec<u32> {
    minimal_spirv(vk::ShaderStageFlags::COMPUTE, "main")
}

pub fn raygen_spirv() -> Vec<u32> {
    minimal_spirv(vk::ShaderStageFlags::RAYGEN_KHR, "main")
}

pub fn miss_spirv() -> Vec<u32> {
    minimal_spirv(vk::ShaderStageFlags::MISS_KHR, "main")
}

device_object! {
    pub struct ShaderModule(vk::ShaderModule) => destroy_shader_module;
}

impl ShaderModule {
    pub fn new(device: Arc<Device>, code: &[u32]) -> HarnessResult<Self> {
        let info = vk::ShaderModuleCreateInfo {
            code_size: code.len() * 4,
            p_code: code.as_ptr(),
            ..Default::default()
        };
        Self::from_info(device, &info)
    }

    pub fn from_info(device: Arc<Device>, info: &vk::ShaderModuleCreateInfo) ->
        HarnessResult<Self>
    {
        let inner =
            unsafe { device.table().create_shader_module(info, None)? };
        Ok(Self { device, inner })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strings() {
        assert_eq!(string_words("main"), [0x6e69_616d, 0]);
        assert_eq!(string_words("abc"), [0x0063_6261]);
    }

    #[test]
    fn module_layout() {
        let words = compute_spirv();
        assert_eq!(words[0], SPIRV_MAGIC);
        assert_eq!(words[3], BOUND);
        // OpCapability directly follows the header.
        assert_eq!(words[5], (2 << 16) | OP_CAPABILITY);
        assert_eq!(*words.last().unwrap(), (1 << 16) | OP_FUNCTION_END);
        assert_ne!(vertex_spirv(), fragment_spirv());
    }

    #[test]
    fn ray_tracing_modules_declare_capability() {
        let words = raygen_spirv();
        assert_eq!(&words[5..7], [(2 << 16) | OP_CAPABILITY, CAPABILITY_SHADER]);
        assert_eq!(&words[7..9],
            [(2 << 16) | OP_CAPABILITY, CAPABILITY_RAY_TRACING]);
        assert_eq!(words[9] & 0xffff, OP_EXTENSION);
        assert!(!compute_spirv().contains(&CAPABILITY_RAY_TRACING));
    }
}
