// SPDX-License-Identifier: CEPL-1.0
//! Instance, physical device selection and the logical device.
//!
//! Construction order is instance → surface → device, so the surface can be
//! used to judge present support. Teardown runs the other way round through
//! the `Drop` impls of [`VkInstance`], [`crate::PresentSurface`] and
//! [`DeviceContext`].
use std::cmp::Reverse;
use std::ffi::{c_void, CStr};

use ash::ext::debug_utils;
use ash::khr::swapchain;
use ash::{vk, Entry};
use raw_window_handle::RawDisplayHandle;
use tracing::{debug, error, info, trace, warn};

use crate::error::{VkError, VkResult};
use crate::surface::PresentSurface;

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";
const ENGINE_NAME: &CStr = c"rayframe";

/// Device extensions every candidate must advertise.
pub const REQUIRED_DEVICE_EXTENSIONS: &[&CStr] = &[swapchain::NAME];

struct DebugMessenger {
    loader: debug_utils::Instance,
    handle: vk::DebugUtilsMessengerEXT,
}

/// Loader entry, instance and (debug builds) the validation messenger.
pub struct VkInstance {
    pub entry: Entry,
    pub instance: ash::Instance,
    debug: Option<DebugMessenger>,
}

impl VkInstance {
    pub fn create(display: RawDisplayHandle) -> VkResult<Self> {
        // SAFETY: the loader library stays loaded for the lifetime of `entry`.
        let entry = unsafe { Entry::load()? };
        let instance = unsafe { create_instance(&entry, display)? };
        let mut this = Self {
            entry,
            instance,
            debug: None,
        };
        if cfg!(debug_assertions) {
            this.debug = unsafe { create_debug_messenger(&this.entry, &this.instance) };
        }
        Ok(this)
    }
}

impl Drop for VkInstance {
    fn drop(&mut self) {
        unsafe {
            if let Some(dbg) = self.debug.take() {
                dbg.loader.destroy_debug_utils_messenger(dbg.handle, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user: *mut c_void,
) -> vk::Bool32 {
    if data.is_null() || unsafe { (*data).p_message.is_null() } {
        return vk::FALSE;
    }
    let msg = unsafe { CStr::from_ptr((*data).p_message) }.to_string_lossy();
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        error!(target: "vulkan", "{msg}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        warn!(target: "vulkan", "{msg}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        debug!(target: "vulkan", "{msg}");
    } else {
        trace!(target: "vulkan", "{msg}");
    }
    vk::FALSE
}

unsafe fn create_instance(entry: &Entry, display: RawDisplayHandle) -> VkResult<ash::Instance> {
    let app_info = vk::ApplicationInfo {
        s_type: vk::StructureType::APPLICATION_INFO,
        p_application_name: ENGINE_NAME.as_ptr(),
        application_version: 0,
        p_engine_name: ENGINE_NAME.as_ptr(),
        engine_version: 0,
        api_version: vk::API_VERSION_1_0,
        ..Default::default()
    };

    let mut extensions = ash_window::enumerate_required_extensions(display)
        .map_err(VkError::device("enumerate_required_extensions"))?
        .to_vec();

    let mut layers = Vec::new();
    if cfg!(debug_assertions) {
        let available = unsafe { entry.enumerate_instance_layer_properties() }.unwrap_or_default();
        let has_validation = available
            .iter()
            .any(|l| unsafe { CStr::from_ptr(l.layer_name.as_ptr()) } == VALIDATION_LAYER);
        if has_validation {
            layers.push(VALIDATION_LAYER.as_ptr());
            extensions.push(debug_utils::NAME.as_ptr());
        } else {
            warn!("{VALIDATION_LAYER:?} not installed; running without validation");
        }
    }

    let create_info = vk::InstanceCreateInfo {
        s_type: vk::StructureType::INSTANCE_CREATE_INFO,
        p_application_info: &app_info,
        enabled_extension_count: extensions.len() as u32,
        pp_enabled_extension_names: extensions.as_ptr(),
        enabled_layer_count: layers.len() as u32,
        pp_enabled_layer_names: layers.as_ptr(),
        ..Default::default()
    };

    unsafe { entry.create_instance(&create_info, None) }.map_err(VkError::device("create_instance"))
}

/// `None` when debug utils were not enabled on the instance.
unsafe fn create_debug_messenger(entry: &Entry, instance: &ash::Instance) -> Option<DebugMessenger> {
    let loader = debug_utils::Instance::new(entry, instance);
    let ci = vk::DebugUtilsMessengerCreateInfoEXT {
        s_type: vk::StructureType::DEBUG_UTILS_MESSENGER_CREATE_INFO_EXT,
        message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
            | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
            | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
            | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
            | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        pfn_user_callback: Some(debug_callback),
        ..Default::default()
    };
    match unsafe { loader.create_debug_utils_messenger(&ci, None) } {
        Ok(handle) => Some(DebugMessenger { loader, handle }),
        Err(e) => {
            debug!("debug messenger unavailable: {e}");
            None
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilies {
    /// Distinct family indices, graphics first.
    pub fn unique(&self) -> Vec<u32> {
        if self.graphics == self.present {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }
}

/// First family with graphics support and first family that can present.
/// They may or may not be the same family.
pub fn find_queue_families(
    props: &[vk::QueueFamilyProperties],
    mut can_present: impl FnMut(u32) -> bool,
) -> Option<QueueFamilies> {
    let graphics = props
        .iter()
        .position(|q| q.queue_count > 0 && q.queue_flags.contains(vk::QueueFlags::GRAPHICS))?;
    let present = (0..props.len() as u32).find(|&i| can_present(i))?;
    Some(QueueFamilies {
        graphics: graphics as u32,
        present,
    })
}

pub fn has_extensions(available: &[vk::ExtensionProperties], required: &[&CStr]) -> bool {
    required.iter().all(|&want| {
        available
            .iter()
            .any(|e| unsafe { CStr::from_ptr(e.extension_name.as_ptr()) } == want)
    })
}

/// Higher is better.
pub fn device_rank(kind: vk::PhysicalDeviceType) -> u8 {
    match kind {
        vk::PhysicalDeviceType::DISCRETE_GPU => 4,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 3,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 2,
        vk::PhysicalDeviceType::CPU => 1,
        _ => 0,
    }
}

/// Best-ranked candidate; ties keep enumeration order.
pub fn pick_best<T>(candidates: impl IntoIterator<Item = (T, vk::PhysicalDeviceType)>) -> Option<T> {
    candidates
        .into_iter()
        .min_by_key(|(_, kind)| Reverse(device_rank(*kind)))
        .map(|(c, _)| c)
}

#[derive(Clone, Debug)]
pub struct PhysicalCandidate {
    pub phys: vk::PhysicalDevice,
    pub families: QueueFamilies,
    pub name: String,
}

/// Rejection reason on `Err`.
unsafe fn evaluate_device(
    instance: &ash::Instance,
    surface: &PresentSurface,
    phys: vk::PhysicalDevice,
) -> Result<(PhysicalCandidate, vk::PhysicalDeviceType), String> {
    let props = unsafe { instance.get_physical_device_properties(phys) };
    let name = unsafe { CStr::from_ptr(props.device_name.as_ptr()) }
        .to_string_lossy()
        .into_owned();

    let exts = unsafe { instance.enumerate_device_extension_properties(phys) }
        .map_err(|e| format!("{name}: enumerate extensions: {e}"))?;
    if !has_extensions(&exts, REQUIRED_DEVICE_EXTENSIONS) {
        return Err(format!("{name}: missing VK_KHR_swapchain"));
    }

    let qprops = unsafe { instance.get_physical_device_queue_family_properties(phys) };
    let families = find_queue_families(&qprops, |i| surface.supports_present(phys, i))
        .ok_or_else(|| format!("{name}: no graphics or present queue family"))?;

    let support = surface
        .query_support(phys)
        .map_err(|e| format!("{name}: surface query: {e}"))?;
    if support.formats.is_empty() || support.present_modes.is_empty() {
        return Err(format!("{name}: surface has no formats or present modes"));
    }

    Ok((
        PhysicalCandidate {
            phys,
            families,
            name,
        },
        props.device_type,
    ))
}

pub fn select_physical_device(
    instance: &ash::Instance,
    surface: &PresentSurface,
) -> VkResult<PhysicalCandidate> {
    let devices = unsafe { instance.enumerate_physical_devices() }
        .map_err(VkError::device("enumerate_physical_devices"))?;

    let mut rejected = Vec::new();
    let mut candidates = Vec::new();
    for phys in devices {
        match unsafe { evaluate_device(instance, surface, phys) } {
            Ok(c) => candidates.push(c),
            Err(reason) => {
                debug!("skipping device: {reason}");
                rejected.push(reason);
            }
        }
    }

    pick_best(candidates).ok_or_else(|| {
        if rejected.is_empty() {
            VkError::NoSuitableDevice("no Vulkan devices found".into())
        } else {
            VkError::NoSuitableDevice(rejected.join("; "))
        }
    })
}

/// Logical device with exactly one queue per distinct family.
pub struct DeviceContext {
    pub instance: ash::Instance,
    pub phys: vk::PhysicalDevice,
    pub device: ash::Device,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
    pub families: QueueFamilies,
    pub name: String,
}

impl DeviceContext {
    pub fn new(instance: &VkInstance, surface: &PresentSurface) -> VkResult<Self> {
        let chosen = select_physical_device(&instance.instance, surface)?;
        let device = unsafe { create_logical_device(&instance.instance, &chosen)? };

        let graphics_queue = unsafe { device.get_device_queue(chosen.families.graphics, 0) };
        let present_queue = unsafe { device.get_device_queue(chosen.families.present, 0) };

        info!(
            "device: {} (graphics family {}, present family {})",
            chosen.name, chosen.families.graphics, chosen.families.present
        );

        Ok(Self {
            instance: instance.instance.clone(),
            phys: chosen.phys,
            device,
            graphics_queue,
            present_queue,
            families: chosen.families,
            name: chosen.name,
        })
    }

    pub fn wait_idle(&self) -> VkResult<()> {
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }

    pub fn memory_properties(&self) -> vk::PhysicalDeviceMemoryProperties {
        unsafe { self.instance.get_physical_device_memory_properties(self.phys) }
    }
}

impl Drop for DeviceContext {
    fn drop(&mut self) {
        unsafe { self.device.destroy_device(None) };
    }
}

unsafe fn create_logical_device(
    instance: &ash::Instance,
    chosen: &PhysicalCandidate,
) -> VkResult<ash::Device> {
    let priorities = [1.0_f32];
    let queue_infos: Vec<_> = chosen
        .families
        .unique()
        .into_iter()
        .map(|family| vk::DeviceQueueCreateInfo {
            s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
            queue_family_index: family,
            queue_count: 1,
            p_queue_priorities: priorities.as_ptr(),
            ..Default::default()
        })
        .collect();

    let extensions: Vec<_> = REQUIRED_DEVICE_EXTENSIONS.iter().map(|e| e.as_ptr()).collect();
    let features = vk::PhysicalDeviceFeatures::default();

    let create_info = vk::DeviceCreateInfo {
        s_type: vk::StructureType::DEVICE_CREATE_INFO,
        queue_create_info_count: queue_infos.len() as u32,
        p_queue_create_infos: queue_infos.as_ptr(),
        enabled_extension_count: extensions.len() as u32,
        pp_enabled_extension_names: extensions.as_ptr(),
        p_enabled_features: &features,
        ..Default::default()
    };

    unsafe { instance.create_device(chosen.phys, &create_info, None) }
        .map_err(VkError::device("create_device"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::c_char;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    fn ext(name: &CStr) -> vk::ExtensionProperties {
        let mut p = vk::ExtensionProperties::default();
        for (dst, &b) in p.extension_name.iter_mut().zip(name.to_bytes()) {
            *dst = b as c_char;
        }
        p
    }

    #[test]
    fn same_family_for_graphics_and_present() {
        let props = [
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
        ];
        let f = find_queue_families(&props, |i| i == 1).unwrap();
        assert_eq!(f, QueueFamilies { graphics: 1, present: 1 });
        assert_eq!(f.unique(), vec![1]);
    }

    #[test]
    fn first_matching_family_wins_for_each_role() {
        let props = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::COMPUTE),
        ];
        let f = find_queue_families(&props, |i| i >= 2).unwrap();
        assert_eq!(f, QueueFamilies { graphics: 0, present: 2 });
        assert_eq!(f.unique(), vec![0, 2]);
    }

    #[test]
    fn missing_role_rejects_device() {
        let props = [family(vk::QueueFlags::COMPUTE)];
        assert_eq!(find_queue_families(&props, |_| true), None);
        let props = [family(vk::QueueFlags::GRAPHICS)];
        assert_eq!(find_queue_families(&props, |_| false), None);
    }

    #[test]
    fn empty_family_does_not_count_as_graphics() {
        let mut empty = family(vk::QueueFlags::GRAPHICS);
        empty.queue_count = 0;
        let props = [empty, family(vk::QueueFlags::GRAPHICS)];
        assert_eq!(find_queue_families(&props, |_| true).unwrap().graphics, 1);
    }

    #[test]
    fn swapchain_extension_is_required() {
        let with = [ext(c"VK_KHR_maintenance1"), ext(swapchain::NAME)];
        let without = [ext(c"VK_KHR_maintenance1")];
        assert!(has_extensions(&with, REQUIRED_DEVICE_EXTENSIONS));
        assert!(!has_extensions(&without, REQUIRED_DEVICE_EXTENSIONS));
        assert!(has_extensions(&without, &[]));
    }

    #[test]
    fn discrete_outranks_integrated_and_ties_keep_order() {
        use vk::PhysicalDeviceType as T;
        assert_eq!(
            pick_best([("igpu", T::INTEGRATED_GPU), ("dgpu", T::DISCRETE_GPU)]),
            Some("dgpu")
        );
        assert_eq!(
            pick_best([("a", T::INTEGRATED_GPU), ("b", T::INTEGRATED_GPU)]),
            Some("a")
        );
        assert_eq!(pick_best([("cpu", T::CPU), ("virt", T::VIRTUAL_GPU)]), Some("virt"));
        assert_eq!(pick_best(Vec::<(u8, T)>::new()), None);
    }
}
