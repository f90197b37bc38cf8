//! Turns raw callback parameters into diagnostic records.
use std::fmt;

use ash::vk;
use bitflags::bitflags;
use derive_more::Display;
use lazy_static::lazy_static;
use regex::Regex;
use smallvec::SmallVec;

use crate::util::{slice, string_from_ptr};

#[derive(Clone, Copy, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Severity {
    #[display(fmt = "ERROR")]
    Error,
    #[display(fmt = "WARNING")]
    Warning,
    #[display(fmt = "PERFORMANCE")]
    Performance,
    #[display(fmt = "INFO")]
    Info,
    #[display(fmt = "VERBOSE")]
    Verbose,
}

bitflags! {
    /// A set of severities, used as an expectation's filter.
    #[derive(Default)]
    pub struct Severities: u32 {
        const ERROR = 0x01;
        const WARNING = 0x02;
        const PERFORMANCE = 0x04;
        const INFO = 0x08;
        const VERBOSE = 0x10;
    }
}

impl Severity {
    pub fn bit(self) -> Severities {
        match self {
            Self::Error => Severities::ERROR,
            Self::Warning => Severities::WARNING,
            Self::Performance => Severities::PERFORMANCE,
            Self::Info => Severities::INFO,
            Self::Verbose => Severities::VERBOSE,
        }
    }

    /// Maps debug-utils severity and type bits. Performance is a message
    /// type there rather than a severity.
    pub fn from_utils(
        severity: vk::DebugUtilsMessageSeverityFlagsEXT,
        types: vk::DebugUtilsMessageTypeFlagsEXT,
    ) -> Self {
        use vk::DebugUtilsMessageSeverityFlagsEXT as Flags;
        if severity.contains(Flags::ERROR) {
            Self::Error
        } else if severity.contains(Flags::WARNING) {
            if types.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE) {
                Self::Performance
            } else {
                Self::Warning
            }
        } else if severity.contains(Flags::INFO) {
            Self::Info
        } else {
            Self::Verbose
        }
    }

    /// Maps debug-report flags; the most severe bit wins.
    pub fn from_report(flags: vk::DebugReportFlagsEXT) -> Self {
        use vk::DebugReportFlagsEXT as Flags;
        if flags.contains(Flags::ERROR) {
            Self::Error
        } else if flags.contains(Flags::WARNING) {
            Self::Warning
        } else if flags.contains(Flags::PERFORMANCE_WARNING) {
            Self::Performance
        } else if flags.contains(Flags::INFORMATION) {
            Self::Info
        } else {
            Self::Verbose
        }
    }

    /// The debug-utils encoding, for emitters.
    pub fn to_utils(self) ->
        (vk::DebugUtilsMessageSeverityFlagsEXT, vk::DebugUtilsMessageTypeFlagsEXT)
    {
        use vk::DebugUtilsMessageSeverityFlagsEXT as Flags;
        use vk::DebugUtilsMessageTypeFlagsEXT as Types;
        match self {
            Self::Error => (Flags::ERROR, Types::VALIDATION),
            Self::Warning => (Flags::WARNING, Types::VALIDATION),
            Self::Performance => (Flags::WARNING, Types::PERFORMANCE),
            Self::Info => (Flags::INFO, Types::GENERAL),
            Self::Verbose => (Flags::VERBOSE, Types::GENERAL),
        }
    }

    /// The debug-report encoding, for emitters.
    pub fn to_report(self) -> vk::DebugReportFlagsEXT {
        use vk::DebugReportFlagsEXT as Flags;
        match self {
            Self::Error => Flags::ERROR,
            Self::Warning => Flags::WARNING,
            Self::Performance => Flags::PERFORMANCE_WARNING,
            Self::Info => Flags::INFORMATION,
            Self::Verbose => Flags::DEBUG,
        }
    }
}

impl From<Severity> for Severities {
    fn from(severity: Severity) -> Self {
        severity.bit()
    }
}

macro_rules! impl_object_type_name {
    ($($type:ident = $value:ident;)*) => {
        /// Human-readable name of an object type.
        pub fn object_type_name(ty: vk::ObjectType) -> &'static str {
            match ty {
                $(vk::ObjectType::$value => stringify!($type),)*
                _ => "unknown type",
            }
        }
    }
}

impl_object_type_name! {
    Instance = INSTANCE;
    PhysicalDevice = PHYSICAL_DEVICE;
    Device = DEVICE;
    Queue = QUEUE;
    Semaphore = SEMAPHORE;
    CommandBuffer = COMMAND_BUFFER;
    Fence = FENCE;
    DeviceMemory = DEVICE_MEMORY;
    Buffer = BUFFER;
    Image = IMAGE;
    Event = EVENT;
    QueryPool = QUERY_POOL;
    BufferView = BUFFER_VIEW;
    ImageView = IMAGE_VIEW;
    ShaderModule = SHADER_MODULE;
    PipelineCache = PIPELINE_CACHE;
    PipelineLayout = PIPELINE_LAYOUT;
    RenderPass = RENDER_PASS;
    Pipeline = PIPELINE;
    DescriptorSetLayout = DESCRIPTOR_SET_LAYOUT;
    Sampler = SAMPLER;
    DescriptorPool = DESCRIPTOR_POOL;
    DescriptorSet = DESCRIPTOR_SET;
    Framebuffer = FRAMEBUFFER;
    CommandPool = COMMAND_POOL;
    DebugReportCallbackEXT = DEBUG_REPORT_CALLBACK_EXT;
    DebugUtilsMessengerEXT = DEBUG_UTILS_MESSENGER_EXT;
    AccelerationStructureKHR = ACCELERATION_STRUCTURE_KHR;
}

/// An object the layer attached to a diagnostic.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ObjectRef {
    pub ty: vk::ObjectType,
    pub handle: u64,
    pub name: Option<String>,
}

impl ObjectRef {
    unsafe fn from_vk(info: &vk::DebugUtilsObjectNameInfoEXT) -> Self {
        let name = if !info.p_object_name.is_null() {
            Some(string_from_ptr(info.p_object_name))
        } else { None };
        Self {
            ty: info.object_type,
            handle: info.object_handle,
            name,
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} 0x{:016x}[{}]",
            object_type_name(self.ty),
            self.handle,
            self.name.as_deref().unwrap_or(""),
        )
    }
}

/// One diagnostic as delivered by the layer.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Record {
    pub severity: Severity,
    /// Empty when the message carries no recognizable identifier.
    pub identifier: String,
    pub message: String,
    pub objects: SmallVec<[ObjectRef; 2]>,
}

impl Record {
    pub fn new(
        severity: Severity,
        identifier: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            identifier: identifier.into(),
            message: message.into(),
            objects: SmallVec::new(),
        }
    }

    /// Builds a record from debug-utils callback data. The message ID
    /// name is preferred over whatever can be recovered from the text.
    pub unsafe fn from_utils(
        severity: vk::DebugUtilsMessageSeverityFlagsEXT,
        types: vk::DebugUtilsMessageTypeFlagsEXT,
        data: &vk::DebugUtilsMessengerCallbackDataEXT,
    ) -> Self {
        let message = string_from_ptr(data.p_message);
        let mut record = classify(Severity::from_utils(severity, types), message);
        let id_name = string_from_ptr(data.p_message_id_name);
        if !id_name.is_empty() {
            record.identifier = id_name;
        }
        record.objects = slice(data.p_objects, data.object_count).iter()
            .map(|obj| ObjectRef::from_vk(obj))
            .collect();
        record
    }

    /// Builds a record from debug-report callback parameters. Debug
    /// report has no message ID name, so the one in the message header
    /// stands in for it.
    pub fn from_report(
        flags: vk::DebugReportFlagsEXT,
        object_type: vk::DebugReportObjectTypeEXT,
        object: u64,
        message: String,
    ) -> Self {
        let mut record = classify(Severity::from_report(flags), message);
        if let Some(name) = header_id_name(&record.message) {
            record.identifier = name.to_owned();
        }
        if object != 0 {
            // Core object types share their values between the two enums.
            record.objects.push(ObjectRef {
                ty: vk::ObjectType::from_raw(object_type.as_raw()),
                handle: object,
                name: None,
            });
        }
        record
    }

    /// The identifier, or the message text when there is none.
    pub fn label(&self) -> &str {
        if self.identifier.is_empty() { &self.message } else { &self.identifier }
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.identifier, self.message)?;
        for obj in self.objects.iter() {
            write!(f, "\n    {}", obj)?;
        }
        Ok(())
    }
}

lazy_static! {
    static ref BRACKETED: Regex = Regex::new(concat!(
        r"\[\s*(VUID-[A-Za-z0-9_]+(?:-[A-Za-z0-9_]+)+",
        r"|UNASSIGNED-[A-Za-z0-9_]+(?:-[A-Za-z0-9_]+)*)\s*\]",
    )).unwrap();
    static ref BARE: Regex = Regex::new(concat!(
        r"VUID-[A-Za-z0-9_]+(?:-[A-Za-z0-9_]+)+",
        r"|UNASSIGNED-[A-Za-z0-9_]+(?:-[A-Za-z0-9_]+)*",
    )).unwrap();
    /// `Validation Error: [ <name> ]`, the header the layer starts
    /// every message with.
    static ref HEADER: Regex = Regex::new(
        r"^[A-Za-z][A-Za-z ]*: \[ ([A-Za-z][A-Za-z0-9_]*(?:-[A-Za-z0-9_]+)*) \]",
    ).unwrap();
}

/// Extracts the identifier from a message. A bracketed
/// `[ VUID-VkBufferCreateInfo-size-00912 ]` wins over a bare token
/// appearing anywhere in the text. Anything not shaped like a `VUID-` or
/// `UNASSIGNED-` identifier is ignored.
pub fn classify(severity: Severity, message: impl Into<String>) -> Record {
    let message = message.into();
    let identifier = BRACKETED.captures(&message)
        .and_then(|caps| caps.get(1))
        .or_else(|| BARE.find(&message))
        .map_or_else(String::new, |m| m.as_str().to_owned());
    Record::new(severity, identifier, message)
}

/// The message ID name from the layer's message header, whatever its
/// shape. Only meaningful for text known to come from the layer.
pub fn header_id_name(message: &str) -> Option<&str> {
    HEADER.captures(message)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

#[cfg(test)]
mod tests {
    use std::ffi::CString;

    use super::*;

    #[test]
    fn bracketed_identifier() {
        let rec = classify(
            Severity::Error,
            "Validation Error: [ VUID-VkBufferCreateInfo-size-00912 ] \
             Object 0: handle = 0x1; | size must be greater than 0.",
        );
        assert_eq!(rec.identifier, "VUID-VkBufferCreateInfo-size-00912");
        assert_eq!(rec.severity, Severity::Error);
        assert!(rec.message.ends_with("greater than 0."));
    }

    #[test]
    fn bare_identifier() {
        let rec = classify(Severity::Warning, "bad thing (VUID-A-0001).");
        assert_eq!(rec.identifier, "VUID-A-0001");
        let rec = classify(
            Severity::Error,
            "UNASSIGNED-CoreValidation-DrawState-InvalidImageLayout: oops",
        );
        assert_eq!(
            rec.identifier,
            "UNASSIGNED-CoreValidation-DrawState-InvalidImageLayout",
        );
    }

    #[test]
    fn subscripts_are_not_identifiers() {
        let rec = classify(
            Severity::Error,
            "pCreateInfos[i].pViewportState is bad \
             (VUID-VkGraphicsPipelineCreateInfo-rasterizerDiscardEnable-00750)",
        );
        assert_eq!(
            rec.identifier,
            "VUID-VkGraphicsPipelineCreateInfo-rasterizerDiscardEnable-00750",
        );
        let rec = classify(Severity::Error, "pViewports[0] is bad");
        assert_eq!(rec.identifier, "");
    }

    #[test]
    fn other_brackets_are_ignored() {
        let rec = classify(Severity::Error, "[ Error ] object is bad");
        assert_eq!(rec.identifier, "");
        let rec = classify(Severity::Error, "[ BarrierDoubleRelease ] twice");
        assert_eq!(rec.identifier, "");
        let rec = classify(
            Severity::Error,
            "[ Error ] see [ UNASSIGNED-CoreValidation-DrawState-InvalidImageLayout ]",
        );
        assert_eq!(
            rec.identifier,
            "UNASSIGNED-CoreValidation-DrawState-InvalidImageLayout",
        );
    }

    #[test]
    fn report_record_takes_header_name() {
        let rec = Record::from_report(
            vk::DebugReportFlagsEXT::ERROR,
            vk::DebugReportObjectTypeEXT::BUFFER,
            0x42,
            "Validation Error: [ BarrierDoubleRelease ] Object 0: handle = 0x42; \
             | buffer released twice".to_owned(),
        );
        assert_eq!(rec.identifier, "BarrierDoubleRelease");
        assert_eq!(rec.severity, Severity::Error);
        assert_eq!(rec.objects[0].ty, vk::ObjectType::BUFFER);

        let rec = Record::from_report(
            vk::DebugReportFlagsEXT::WARNING,
            vk::DebugReportObjectTypeEXT::UNKNOWN,
            0,
            "[ Error ] object is bad".to_owned(),
        );
        assert_eq!(rec.identifier, "");
        assert!(rec.objects.is_empty());
        assert_eq!(header_id_name("pViewports[0] is bad"), None);
    }

    #[test]
    fn no_identifier() {
        let rec = classify(Severity::Info, "was created with a sample count of 4");
        assert!(rec.identifier.is_empty());
        assert_eq!(rec.label(), "was created with a sample count of 4");
    }

    #[test]
    fn severity_mapping() {
        use vk::DebugUtilsMessageSeverityFlagsEXT as Flags;
        use vk::DebugUtilsMessageTypeFlagsEXT as Types;
        assert_eq!(
            Severity::from_utils(Flags::WARNING, Types::PERFORMANCE),
            Severity::Performance,
        );
        assert_eq!(
            Severity::from_utils(Flags::WARNING, Types::VALIDATION),
            Severity::Warning,
        );
        assert_eq!(
            Severity::from_report(
                vk::DebugReportFlagsEXT::ERROR | vk::DebugReportFlagsEXT::DEBUG,
            ),
            Severity::Error,
        );
        for &sev in [
            Severity::Error, Severity::Warning, Severity::Performance,
            Severity::Info, Severity::Verbose,
        ].iter() {
            let (s, t) = sev.to_utils();
            assert_eq!(Severity::from_utils(s, t), sev);
            assert_eq!(Severity::from_report(sev.to_report()), sev);
        }
    }

    #[test]
    fn utils_record_prefers_id_name() {
        let message = CString::new("Validation Error: [ VUID-X-y-1 ] z").unwrap();
        let id_name = CString::new("VUID-X-y-2").unwrap();
        let objects = [vk::DebugUtilsObjectNameInfoEXT {
            object_type: vk::ObjectType::BUFFER,
            object_handle: 0x42,
            ..Default::default()
        }];
        let data = vk::DebugUtilsMessengerCallbackDataEXT {
            p_message_id_name: id_name.as_ptr(),
            p_message: message.as_ptr(),
            object_count: 1,
            p_objects: objects.as_ptr(),
            ..Default::default()
        };
        let rec = unsafe { Record::from_utils(
            vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION,
            &data,
        ) };
        assert_eq!(rec.identifier, "VUID-X-y-2");
        assert_eq!(rec.objects.len(), 1);
        assert_eq!(rec.objects[0].to_string(), "Buffer 0x0000000000000042[]");
    }
}
