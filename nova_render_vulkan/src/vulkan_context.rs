/// VulkanContext - instance, device, queues and surface shared by the backend
///
/// Bring-up order:
/// - Entry, instance (validation layer + debug messenger when enabled)
/// - Window surface
/// - Physical device chosen by `GpuPreference` among devices that support
///   Vulkan 1.3, timeline semaphores, dynamic rendering and synchronization2
/// - Logical device with descriptor indexing, buffer device address and,
///   when every extension is present, ray-tracing pipelines
///
/// Teardown happens in `Drop`, after the owner released everything created
/// from the device.

use ash::vk;
use nova_render::config::{Config, GpuPreference};
use nova_render::nova::{Error, Result};
use nova_render::{engine_debug, engine_error, engine_info, engine_warn};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::sync::Mutex;

use crate::vulkan_debug;

const SOURCE: &str = "nova::vulkan";

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// What the selected device can do beyond the required baseline
#[derive(Debug, Clone, Default)]
pub(crate) struct DeviceCapabilities {
    pub device_name: String,
    pub buffer_device_address: bool,
    /// Pools may hold update-after-bind sets
    pub update_after_bind: bool,
    pub ray_tracing: bool,
    pub max_ray_recursion_depth: u32,
    pub shader_group_handle_size: u32,
    pub shader_group_handle_alignment: u32,
    pub shader_group_base_alignment: u32,
    pub sampler_anisotropy: bool,
    pub max_sampler_anisotropy: f32,
}

/// Optional features reported by a physical device
#[derive(Debug, Clone, Copy, Default)]
struct SupportedFeatures {
    timeline_semaphore: bool,
    dynamic_rendering: bool,
    synchronization2: bool,
    buffer_device_address: bool,
    descriptor_indexing: bool,
    partially_bound: bool,
    runtime_descriptor_array: bool,
    variable_descriptor_count: bool,
    update_unused_while_pending: bool,
    sampled_image_update_after_bind: bool,
    storage_image_update_after_bind: bool,
    storage_buffer_update_after_bind: bool,
    sampled_image_non_uniform_indexing: bool,
    sampler_anisotropy: bool,
}

/// A physical device that passed the baseline checks
struct Candidate {
    physical_device: vk::PhysicalDevice,
    properties: vk::PhysicalDeviceProperties,
    graphics_family: u32,
    present_family: u32,
    features: SupportedFeatures,
    ray_tracing_extensions: bool,
}

pub(crate) struct VulkanContext {
    /// Keeps the Vulkan library loaded
    _entry: ash::Entry,
    pub instance: ash::Instance,
    pub physical_device: vk::PhysicalDevice,
    pub device: ash::Device,

    pub graphics_queue: vk::Queue,
    pub graphics_family: u32,
    pub present_queue: vk::Queue,
    pub present_family: u32,
    /// Serializes queue submission and presentation
    pub queue_lock: Mutex<()>,

    pub surface: vk::SurfaceKHR,
    pub surface_loader: ash::khr::surface::Instance,
    pub swapchain_loader: ash::khr::swapchain::Device,
    pub ray_tracing: Option<ash::khr::ray_tracing_pipeline::Device>,
    pub capabilities: DeviceCapabilities,

    debug_messenger: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
    debug_names: Option<ash::ext::debug_utils::Device>,
}

impl VulkanContext {
    /// Bring up Vulkan for `window`
    ///
    /// # Arguments
    ///
    /// * `window` - Window whose surface will be presented to
    /// * `config` - App name, GPU preference and validation settings
    pub fn new<W: HasDisplayHandle + HasWindowHandle>(window: &W, config: &Config) -> Result<Self> {
        unsafe {
            let entry = ash::Entry::load().map_err(|e| {
                engine_error!(SOURCE, "Failed to load Vulkan library: {:?}", e);
                Error::InitializationFailed(format!("Failed to load Vulkan library: {:?}", e))
            })?;

            let display_handle = window.display_handle().map_err(|e| {
                engine_error!(SOURCE, "Failed to get display handle: {}", e);
                Error::InitializationFailed(format!("Failed to get display handle: {}", e))
            })?;
            let window_handle = window.window_handle().map_err(|e| {
                engine_error!(SOURCE, "Failed to get window handle: {}", e);
                Error::InitializationFailed(format!("Failed to get window handle: {}", e))
            })?;

            let validation = (config.enable_validation || cfg!(feature = "vulkan-validation"))
                && Self::validation_layer_available(&entry);

            let instance = Self::create_instance(&entry, config, display_handle.as_raw(), validation)?;

            let debug_messenger = if validation {
                match Self::create_debug_messenger(&entry, &instance, config) {
                    Ok(messenger) => Some(messenger),
                    Err(e) => {
                        instance.destroy_instance(None);
                        return Err(e);
                    }
                }
            } else {
                None
            };

            let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);
            let surface = match ash_window::create_surface(
                &entry,
                &instance,
                display_handle.as_raw(),
                window_handle.as_raw(),
                None,
            ) {
                Ok(surface) => surface,
                Err(e) => {
                    engine_error!(SOURCE, "Failed to create surface: {:?}", e);
                    Self::destroy_instance_level(&instance, &surface_loader, vk::SurfaceKHR::null(), &debug_messenger);
                    return Err(Error::InitializationFailed(format!("Failed to create surface: {:?}", e)));
                }
            };

            let opened = Self::select_physical_device(&instance, &surface_loader, surface, config.gpu_preference)
                .and_then(|candidate| Self::create_device(&instance, candidate));
            let (candidate, device, capabilities) = match opened {
                Ok(opened) => opened,
                Err(e) => {
                    Self::destroy_instance_level(&instance, &surface_loader, surface, &debug_messenger);
                    return Err(e);
                }
            };

            let graphics_queue = device.get_device_queue(candidate.graphics_family, 0);
            let present_queue = device.get_device_queue(candidate.present_family, 0);
            let swapchain_loader = ash::khr::swapchain::Device::new(&instance, &device);
            let ray_tracing = capabilities
                .ray_tracing
                .then(|| ash::khr::ray_tracing_pipeline::Device::new(&instance, &device));
            let debug_names = debug_messenger
                .is_some()
                .then(|| ash::ext::debug_utils::Device::new(&instance, &device));

            engine_info!(
                SOURCE,
                "Vulkan device '{}' ready (validation: {}, ray tracing: {}, buffer device address: {})",
                capabilities.device_name, validation, capabilities.ray_tracing, capabilities.buffer_device_address
            );

            Ok(Self {
                _entry: entry,
                instance,
                physical_device: candidate.physical_device,
                device,
                graphics_queue,
                graphics_family: candidate.graphics_family,
                present_queue,
                present_family: candidate.present_family,
                queue_lock: Mutex::new(()),
                surface,
                surface_loader,
                swapchain_loader,
                ray_tracing,
                capabilities,
                debug_messenger,
                debug_names,
            })
        }
    }

    /// Attach a debug name to a Vulkan object (no-op without validation)
    pub fn set_name<T: vk::Handle>(&self, handle: T, name: &str) {
        let Some(debug_names) = &self.debug_names else { return };
        let Ok(name) = CString::new(name) else { return };
        let info = vk::DebugUtilsObjectNameInfoEXT::default()
            .object_handle(handle)
            .object_name(&name);
        unsafe {
            if let Err(e) = debug_names.set_debug_utils_object_name(&info) {
                engine_debug!(SOURCE, "Failed to name object {:?}: {:?}", name, e);
            }
        }
    }

    // ===== INSTANCE =====

    unsafe fn validation_layer_available(entry: &ash::Entry) -> bool {
        let available = entry
            .enumerate_instance_layer_properties()
            .map(|layers| {
                layers
                    .iter()
                    .any(|layer| CStr::from_ptr(layer.layer_name.as_ptr()) == VALIDATION_LAYER)
            })
            .unwrap_or(false);
        if !available {
            engine_warn!(SOURCE, "Validation requested but {:?} is not installed", VALIDATION_LAYER);
        }
        available
    }

    unsafe fn create_instance(
        entry: &ash::Entry,
        config: &Config,
        display: raw_window_handle::RawDisplayHandle,
        validation: bool,
    ) -> Result<ash::Instance> {
        let app_name = CString::new(config.app_name.as_str()).map_err(|_| {
            engine_error!(SOURCE, "Application name contains a NUL byte");
            Error::InitializationFailed("application name contains a NUL byte".to_string())
        })?;

        let app_info = vk::ApplicationInfo::default()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(c"Nova")
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_3);

        let mut extension_names = ash_window::enumerate_required_extensions(display)
            .map_err(|e| {
                engine_error!(SOURCE, "Failed to get required extensions: {}", e);
                Error::InitializationFailed(format!("Failed to get required extensions: {}", e))
            })?
            .to_vec();
        if validation {
            extension_names.push(ash::ext::debug_utils::NAME.as_ptr());
        }

        let layer_names: Vec<*const c_char> = if validation {
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            vec![]
        };

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_layer_names(&layer_names)
            .enabled_extension_names(&extension_names);

        entry.create_instance(&create_info, None).map_err(|e| {
            engine_error!(SOURCE, "Failed to create Vulkan instance: {:?}", e);
            Error::InitializationFailed(format!("Failed to create instance: {:?}", e))
        })
    }

    unsafe fn create_debug_messenger(
        entry: &ash::Entry,
        instance: &ash::Instance,
        config: &Config,
    ) -> Result<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)> {
        let debug_utils = ash::ext::debug_utils::Instance::new(entry, instance);
        vulkan_debug::init_debug_config(config.debug_severity);

        let debug_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(vulkan_debug::messenger_severity_flags(config.debug_severity))
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(vulkan_debug::vulkan_debug_callback));

        let messenger = debug_utils
            .create_debug_utils_messenger(&debug_info, None)
            .map_err(|e| {
                vulkan_debug::cleanup_debug_config();
                engine_error!(SOURCE, "Failed to create debug messenger: {:?}", e);
                Error::InitializationFailed(format!("Failed to create debug messenger: {:?}", e))
            })?;

        Ok((debug_utils, messenger))
    }

    unsafe fn destroy_instance_level(
        instance: &ash::Instance,
        surface_loader: &ash::khr::surface::Instance,
        surface: vk::SurfaceKHR,
        debug_messenger: &Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
    ) {
        if surface != vk::SurfaceKHR::null() {
            surface_loader.destroy_surface(surface, None);
        }
        if let Some((debug_utils, messenger)) = debug_messenger {
            vulkan_debug::cleanup_debug_config();
            debug_utils.destroy_debug_utils_messenger(*messenger, None);
        }
        instance.destroy_instance(None);
    }

    // ===== PHYSICAL DEVICE =====

    unsafe fn select_physical_device(
        instance: &ash::Instance,
        surface_loader: &ash::khr::surface::Instance,
        surface: vk::SurfaceKHR,
        preference: GpuPreference,
    ) -> Result<Candidate> {
        let physical_devices = instance.enumerate_physical_devices().map_err(|e| {
            engine_error!(SOURCE, "Failed to enumerate physical devices: {:?}", e);
            Error::InitializationFailed(format!("Failed to enumerate physical devices: {:?}", e))
        })?;

        physical_devices
            .into_iter()
            .filter_map(|pd| Self::evaluate(instance, surface_loader, surface, pd))
            .min_by_key(|candidate| preference_rank(preference, candidate.properties.device_type))
            .ok_or_else(|| {
                engine_error!(
                    SOURCE,
                    "No GPU supports Vulkan 1.3 with timeline semaphores, dynamic rendering and synchronization2"
                );
                Error::InitializationFailed("no suitable Vulkan device found".to_string())
            })
    }

    /// Baseline checks, `None` when the device cannot be used
    unsafe fn evaluate(
        instance: &ash::Instance,
        surface_loader: &ash::khr::surface::Instance,
        surface: vk::SurfaceKHR,
        physical_device: vk::PhysicalDevice,
    ) -> Option<Candidate> {
        let properties = instance.get_physical_device_properties(physical_device);
        let name = CStr::from_ptr(properties.device_name.as_ptr()).to_string_lossy().into_owned();

        if properties.api_version < vk::API_VERSION_1_3 {
            engine_debug!(SOURCE, "Skipping '{}': Vulkan {}.{}", name,
                vk::api_version_major(properties.api_version), vk::api_version_minor(properties.api_version));
            return None;
        }

        let extensions = instance.enumerate_device_extension_properties(physical_device).ok()?;
        let has_extension = |wanted: &CStr| {
            extensions.iter().any(|ext| CStr::from_ptr(ext.extension_name.as_ptr()) == wanted)
        };
        if !has_extension(ash::khr::swapchain::NAME) {
            engine_debug!(SOURCE, "Skipping '{}': no swapchain support", name);
            return None;
        }
        let ray_tracing_extensions = has_extension(ash::khr::ray_tracing_pipeline::NAME)
            && has_extension(ash::khr::acceleration_structure::NAME)
            && has_extension(ash::khr::deferred_host_operations::NAME);

        let features = Self::query_features(instance, physical_device);
        if !(features.timeline_semaphore && features.dynamic_rendering && features.synchronization2) {
            engine_debug!(SOURCE, "Skipping '{}': missing required features {:?}", name, features);
            return None;
        }

        let families = instance.get_physical_device_queue_family_properties(physical_device);
        let supports_present = |index: u32| {
            surface_loader
                .get_physical_device_surface_support(physical_device, index, surface)
                .unwrap_or(false)
        };
        let graphics: Vec<u32> = (0..families.len() as u32)
            .filter(|&i| families[i as usize].queue_flags.contains(vk::QueueFlags::GRAPHICS))
            .collect();
        // Prefer one family doing both
        let (graphics_family, present_family) = match graphics.iter().copied().find(|&i| supports_present(i)) {
            Some(family) => (family, family),
            None => {
                let graphics_family = *graphics.first()?;
                let present_family = (0..families.len() as u32).find(|&i| supports_present(i))?;
                (graphics_family, present_family)
            }
        };

        engine_debug!(SOURCE, "Candidate GPU '{}' ({:?})", name, properties.device_type);
        Some(Candidate {
            physical_device,
            properties,
            graphics_family,
            present_family,
            features,
            ray_tracing_extensions,
        })
    }

    unsafe fn query_features(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> SupportedFeatures {
        let mut features12 = vk::PhysicalDeviceVulkan12Features::default();
        let mut features13 = vk::PhysicalDeviceVulkan13Features::default();
        let mut features2 = vk::PhysicalDeviceFeatures2::default()
            .push_next(&mut features12)
            .push_next(&mut features13);
        instance.get_physical_device_features2(physical_device, &mut features2);
        let core = features2.features;

        SupportedFeatures {
            timeline_semaphore: features12.timeline_semaphore == vk::TRUE,
            dynamic_rendering: features13.dynamic_rendering == vk::TRUE,
            synchronization2: features13.synchronization2 == vk::TRUE,
            buffer_device_address: features12.buffer_device_address == vk::TRUE,
            descriptor_indexing: features12.descriptor_indexing == vk::TRUE,
            partially_bound: features12.descriptor_binding_partially_bound == vk::TRUE,
            runtime_descriptor_array: features12.runtime_descriptor_array == vk::TRUE,
            variable_descriptor_count: features12.descriptor_binding_variable_descriptor_count == vk::TRUE,
            update_unused_while_pending: features12.descriptor_binding_update_unused_while_pending == vk::TRUE,
            sampled_image_update_after_bind: features12.descriptor_binding_sampled_image_update_after_bind == vk::TRUE,
            storage_image_update_after_bind: features12.descriptor_binding_storage_image_update_after_bind == vk::TRUE,
            storage_buffer_update_after_bind: features12.descriptor_binding_storage_buffer_update_after_bind == vk::TRUE,
            sampled_image_non_uniform_indexing: features12.shader_sampled_image_array_non_uniform_indexing == vk::TRUE,
            sampler_anisotropy: core.sampler_anisotropy == vk::TRUE,
        }
    }

    // ===== LOGICAL DEVICE =====

    unsafe fn create_device(
        instance: &ash::Instance,
        candidate: Candidate,
    ) -> Result<(Candidate, ash::Device, DeviceCapabilities)> {
        let supported = candidate.features;
        let ray_tracing = candidate.ray_tracing_extensions && supported.buffer_device_address;

        let queue_priorities = [1.0];
        let mut queue_create_infos = vec![vk::DeviceQueueCreateInfo::default()
            .queue_family_index(candidate.graphics_family)
            .queue_priorities(&queue_priorities)];
        if candidate.present_family != candidate.graphics_family {
            queue_create_infos.push(
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(candidate.present_family)
                    .queue_priorities(&queue_priorities),
            );
        }

        let mut extension_names = vec![ash::khr::swapchain::NAME.as_ptr()];
        if ray_tracing {
            extension_names.push(ash::khr::ray_tracing_pipeline::NAME.as_ptr());
            extension_names.push(ash::khr::acceleration_structure::NAME.as_ptr());
            extension_names.push(ash::khr::deferred_host_operations::NAME.as_ptr());
        }

        let mut enabled12 = vk::PhysicalDeviceVulkan12Features::default()
            .timeline_semaphore(true)
            .buffer_device_address(supported.buffer_device_address)
            .descriptor_indexing(supported.descriptor_indexing)
            .descriptor_binding_partially_bound(supported.partially_bound)
            .runtime_descriptor_array(supported.runtime_descriptor_array)
            .descriptor_binding_variable_descriptor_count(supported.variable_descriptor_count)
            .descriptor_binding_update_unused_while_pending(supported.update_unused_while_pending)
            .descriptor_binding_sampled_image_update_after_bind(supported.sampled_image_update_after_bind)
            .descriptor_binding_storage_image_update_after_bind(supported.storage_image_update_after_bind)
            .descriptor_binding_storage_buffer_update_after_bind(supported.storage_buffer_update_after_bind)
            .shader_sampled_image_array_non_uniform_indexing(supported.sampled_image_non_uniform_indexing);
        let mut enabled13 = vk::PhysicalDeviceVulkan13Features::default()
            .dynamic_rendering(true)
            .synchronization2(true);
        let mut ray_tracing_features = vk::PhysicalDeviceRayTracingPipelineFeaturesKHR::default()
            .ray_tracing_pipeline(true);
        let mut acceleration_features = vk::PhysicalDeviceAccelerationStructureFeaturesKHR::default()
            .acceleration_structure(true);

        let core = vk::PhysicalDeviceFeatures::default().sampler_anisotropy(supported.sampler_anisotropy);
        let mut features2 = vk::PhysicalDeviceFeatures2::default()
            .features(core)
            .push_next(&mut enabled12)
            .push_next(&mut enabled13);
        if ray_tracing {
            features2 = features2
                .push_next(&mut ray_tracing_features)
                .push_next(&mut acceleration_features);
        }

        let device_create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_names)
            .push_next(&mut features2);

        let device = instance
            .create_device(candidate.physical_device, &device_create_info, None)
            .map_err(|e| {
                engine_error!(SOURCE, "Failed to create logical device: {:?}", e);
                Error::InitializationFailed(format!("Failed to create device: {:?}", e))
            })?;

        let mut ray_tracing_properties = vk::PhysicalDeviceRayTracingPipelinePropertiesKHR::default();
        if ray_tracing {
            let mut properties2 = vk::PhysicalDeviceProperties2::default().push_next(&mut ray_tracing_properties);
            instance.get_physical_device_properties2(candidate.physical_device, &mut properties2);
        }

        let capabilities = DeviceCapabilities {
            device_name: CStr::from_ptr(candidate.properties.device_name.as_ptr())
                .to_string_lossy()
                .into_owned(),
            buffer_device_address: supported.buffer_device_address,
            update_after_bind: supported.sampled_image_update_after_bind
                || supported.storage_image_update_after_bind
                || supported.storage_buffer_update_after_bind,
            ray_tracing,
            max_ray_recursion_depth: ray_tracing_properties.max_ray_recursion_depth,
            shader_group_handle_size: ray_tracing_properties.shader_group_handle_size,
            shader_group_handle_alignment: ray_tracing_properties.shader_group_handle_alignment,
            shader_group_base_alignment: ray_tracing_properties.shader_group_base_alignment,
            sampler_anisotropy: supported.sampler_anisotropy,
            max_sampler_anisotropy: candidate.properties.limits.max_sampler_anisotropy,
        };

        Ok((candidate, device, capabilities))
    }
}

impl Drop for VulkanContext {
    fn drop(&mut self) {
        unsafe {
            self.device.device_wait_idle().ok();
            self.device.destroy_device(None);
            Self::destroy_instance_level(&self.instance, &self.surface_loader, self.surface, &self.debug_messenger);
        }
    }
}

/// Sort key for device selection, lower is better
pub(crate) fn preference_rank(preference: GpuPreference, device_type: vk::PhysicalDeviceType) -> u32 {
    let order: [vk::PhysicalDeviceType; 2] = match preference {
        GpuPreference::Any => return 0,
        GpuPreference::Discrete => [vk::PhysicalDeviceType::DISCRETE_GPU, vk::PhysicalDeviceType::INTEGRATED_GPU],
        GpuPreference::Integrated => [vk::PhysicalDeviceType::INTEGRATED_GPU, vk::PhysicalDeviceType::DISCRETE_GPU],
    };
    match order.iter().position(|&ty| ty == device_type) {
        Some(rank) => rank as u32,
        None if device_type == vk::PhysicalDeviceType::VIRTUAL_GPU => 2,
        None => 3,
    }
}

#[cfg(test)]
#[path = "vulkan_context_tests.rs"]
mod tests;
