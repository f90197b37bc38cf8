use std::ffi::CStr;
use std::os::raw::c_char;

use ash::vk;

/// Returns the smallest multiple of `alignment` that is `>= offset`.
#[inline(always)]
pub(crate) fn align(alignment: vk::DeviceSize, offset: vk::DeviceSize) ->
    vk::DeviceSize
{
    if alignment == 0 { return offset; }
    ((offset + alignment - 1) / alignment) * alignment
}

pub(crate) trait SliceExt {
    type Target: Sized;

    /// Converts a slice to a *non-dangling* pointer. This means that,
    /// if the slice has length zero, the returned pointer is NULL.
    /// Though it is hardly undocumented, this is not the case for
    /// `slice::as_ptr`.
    fn c_ptr(&self) -> *const Self::Target;
}

impl<T> SliceExt for [T] {
    type Target = T;

    #[inline(always)]
    fn c_ptr(&self) -> *const Self::Target {
        if self.is_empty() {
            std::ptr::null()
        } else {
            self.as_ptr()
        }
    }
}

/// Borrows a C array, tolerating a null pointer when the count is zero.
#[inline]
pub(crate) unsafe fn slice<'a, T>(ptr: *const T, len: u32) -> &'a [T] {
    if ptr.is_null() || len == 0 {
        &[]
    } else {
        std::slice::from_raw_parts(ptr, len as usize)
    }
}

/// Copies a possibly-null C string.
pub(crate) unsafe fn string_from_ptr(ptr: *const c_char) -> String {
    if ptr.is_null() {
        String::new()
    } else {
        CStr::from_ptr(ptr).to_string_lossy().into_owned()
    }
}

/// Reads a name out of a fixed-size array such as
/// `VkExtensionProperties::extensionName`.
pub(crate) fn fixed_str(chars: &[c_char]) -> &str {
    let len = chars.iter().position(|&c| c == 0).unwrap_or(chars.len());
    let bytes = unsafe {
        std::slice::from_raw_parts(chars.as_ptr() as *const u8, len)
    };
    std::str::from_utf8(bytes).unwrap_or("")
}

/// Writes a name into a fixed-size, NUL-terminated array, truncating if
/// necessary.
pub(crate) fn write_fixed_str(dst: &mut [c_char], src: &str) {
    let len = src.len().min(dst.len().saturating_sub(1));
    for (d, &s) in dst.iter_mut().zip(src.as_bytes()[..len].iter()) {
        *d = s as c_char;
    }
    if let Some(end) = dst.get_mut(len) {
        *end = 0;
    }
}

pub fn version_string(version: u32) -> String {
    format!(
        "{}.{}.{}",
        vk::api_version_major(version),
        vk::api_version_minor(version),
        vk::api_version_patch(version),
    )
}

/// Views the feature struct as the array of booleans it is.
pub(crate) fn feature_bits(features: &vk::PhysicalDeviceFeatures) ->
    &[vk::Bool32]
{
    let len = std::mem::size_of::<vk::PhysicalDeviceFeatures>()
        / std::mem::size_of::<vk::Bool32>();
    unsafe {
        std::slice::from_raw_parts(
            features as *const vk::PhysicalDeviceFeatures as *const vk::Bool32,
            len,
        )
    }
}

/// True if every feature enabled in `required` is enabled in `available`.
pub fn features_satisfied(
    available: &vk::PhysicalDeviceFeatures,
    required: &vk::PhysicalDeviceFeatures,
) -> bool {
    feature_bits(available).iter()
        .zip(feature_bits(required).iter())
        .all(|(&have, &want)| want == vk::FALSE || have != vk::FALSE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_rounds_up() {
        assert_eq!(align(256, 0), 0);
        assert_eq!(align(256, 1), 256);
        assert_eq!(align(256, 512), 512);
        assert_eq!(align(0, 7), 7);
    }

    #[test]
    fn fixed_strings() {
        let mut buf = [0 as c_char; 8];
        write_fixed_str(&mut buf, "VK_EXT_long_name");
        assert_eq!(fixed_str(&buf), "VK_EXT_");
        write_fixed_str(&mut buf, "abc");
        assert_eq!(fixed_str(&buf), "abc");
    }

    #[test]
    fn feature_subsets() {
        let available = vk::PhysicalDeviceFeatures {
            multi_viewport: vk::TRUE,
            sampler_anisotropy: vk::TRUE,
            ..Default::default()
        };
        let mut required = vk::PhysicalDeviceFeatures {
            multi_viewport: vk::TRUE,
            ..Default::default()
        };
        assert!(features_satisfied(&available, &required));
        required.wide_lines = vk::TRUE;
        assert!(!features_satisfied(&available, &required));
        assert_eq!(feature_bits(&available).len(), 55);
    }
}
