//! NVS (Non-Volatile Storage) adapter.
//!
//! Implements [`ConfigPort`]: the whole [`DeviceConfig`] is kept as one
//! postcard blob under `waterpal::devcfg`.  Unlike the retained record it
//! survives power loss and reflashing (NVS lives in its own partition).
//!
//! - Validation: every field is range-checked before it is persisted.
//! - Atomic writes: ESP-IDF NVS commits are atomic per `nvs_commit()`.
//! - Host builds use an in-memory map.

use crate::app::ports::{ConfigError, ConfigPort};
use crate::config::DeviceConfig;
use crate::retry::{Budget, RetryPolicy};
use log::info;
#[cfg(target_os = "espidf")]
use log::warn;

#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

const CONFIG_NAMESPACE: &str = "waterpal";
#[cfg(not(target_os = "espidf"))]
const CONFIG_KEY: &str = "devcfg";

#[cfg(target_os = "espidf")]
const MAX_BLOB_SIZE: usize = 4000;

pub struct NvsAdapter {
    #[cfg(not(target_os = "espidf"))]
    store: std::cell::RefCell<HashMap<String, Vec<u8>>>,
}

impl NvsAdapter {
    /// Initialise NVS flash.
    ///
    /// On first boot or after a version mismatch the partition is erased
    /// and re-initialised.
    pub fn new() -> Result<Self, ConfigError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: called once from the main task before any NVS access.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES || ret == ESP_ERR_NVS_NEW_VERSION_FOUND {
                warn!("NVS: erasing and re-initialising flash partition");
                if unsafe { nvs_flash_erase() } != ESP_OK {
                    return Err(ConfigError::IoError);
                }
                if unsafe { nvs_flash_init() } != ESP_OK {
                    return Err(ConfigError::IoError);
                }
            } else if ret != ESP_OK {
                return Err(ConfigError::IoError);
            }
            info!("NvsAdapter: ESP-IDF NVS initialised");
        }

        #[cfg(not(target_os = "espidf"))]
        info!("NvsAdapter: simulation backend");

        Ok(Self {
            #[cfg(not(target_os = "espidf"))]
            store: std::cell::RefCell::new(HashMap::new()),
        })
    }

    #[cfg(not(target_os = "espidf"))]
    fn composite_key() -> String {
        format!("{}::{}", CONFIG_NAMESPACE, CONFIG_KEY)
    }

    /// Overwrite the stored blob without validation (host tests only).
    #[cfg(not(target_os = "espidf"))]
    pub fn put_raw(&self, bytes: &[u8]) {
        self.store.borrow_mut().insert(Self::composite_key(), bytes.to_vec());
    }

    /// Open the config namespace, run `f` with the handle, close.
    #[cfg(target_os = "espidf")]
    fn with_nvs_handle<F, T>(write: bool, f: F) -> Result<T, i32>
    where
        F: FnOnce(nvs_handle_t) -> Result<T, i32>,
    {
        let mut ns_buf = [0u8; 16];
        let ns_bytes = CONFIG_NAMESPACE.as_bytes();
        let len = ns_bytes.len().min(15);
        ns_buf[..len].copy_from_slice(&ns_bytes[..len]);

        let mut handle: nvs_handle_t = 0;
        let mode = if write {
            nvs_open_mode_t_NVS_READWRITE
        } else {
            nvs_open_mode_t_NVS_READONLY
        };

        let ret = unsafe { nvs_open(ns_buf.as_ptr() as *const _, mode, &mut handle) };
        if ret != ESP_OK {
            return Err(ret);
        }

        let result = f(handle);
        unsafe {
            nvs_close(handle);
        }
        result
    }
}

fn validate_policy(p: &RetryPolicy, what: &'static str) -> Result<(), ConfigError> {
    if let Budget::Limited(n) = p.budget {
        if !(1..=50).contains(&n) {
            return Err(ConfigError::ValidationFailed(what));
        }
    }
    if p.delay_ms > 30_000 {
        return Err(ConfigError::ValidationFailed(what));
    }
    Ok(())
}

pub(crate) fn validate_config(cfg: &DeviceConfig) -> Result<(), ConfigError> {
    if cfg.sms_recipients.is_empty() {
        return Err(ConfigError::ValidationFailed("sms_recipients must not be empty"));
    }
    for r in &cfg.sms_recipients {
        let digits = r.strip_prefix('+').unwrap_or("");
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ConfigError::ValidationFailed(
                "sms_recipients must be +<digits>",
            ));
        }
    }
    if !(1..=50).contains(&cfg.sms_retry_count) || !(1..=50).contains(&cfg.sms_short_retry_count) {
        return Err(ConfigError::ValidationFailed("sms retry counts must be 1–50"));
    }
    if cfg.sms_retry_delay_ms > 60_000 {
        return Err(ConfigError::ValidationFailed("sms_retry_delay_ms must be ≤ 60000"));
    }
    if cfg.use_gprs && cfg.apn.is_empty() {
        return Err(ConfigError::ValidationFailed("apn required when use_gprs is set"));
    }
    if !(5_000..=300_000).contains(&cfg.http_timeout_ms) {
        return Err(ConfigError::ValidationFailed("http_timeout_ms must be 5000–300000"));
    }
    if !(5_000..=300_000).contains(&cfg.network_timeout_ms) {
        return Err(ConfigError::ValidationFailed("network_timeout_ms must be 5000–300000"));
    }
    if !(10_000..=600_000).contains(&cfg.gps_fix_timeout_ms) {
        return Err(ConfigError::ValidationFailed("gps_fix_timeout_ms must be 10000–600000"));
    }
    if !(cfg.flow_rate_lph > 0.0 && cfg.flow_rate_lph <= 10_000.0) {
        return Err(ConfigError::ValidationFailed("flow_rate_lph must be in (0, 10000]"));
    }
    if !(60..=7 * 24 * 60 * 60).contains(&cfg.report_interval_s) {
        return Err(ConfigError::ValidationFailed("report_interval_s must be 60 s – 7 days"));
    }
    validate_policy(&cfg.battery_retry, "battery_retry out of range")?;
    validate_policy(&cfg.signal_retry, "signal_retry out of range")?;
    validate_policy(&cfg.humidity_retry, "humidity_retry out of range")?;
    validate_policy(&cfg.temperature_retry, "temperature_retry out of range")?;
    if cfg.query_backend.host.is_empty() || !cfg.query_backend.path.starts_with('/') {
        return Err(ConfigError::ValidationFailed("query_backend needs host and /path"));
    }
    if let Some(json) = &cfg.json_backend {
        if json.host.is_empty() || !json.path.starts_with('/') || json.key_header.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "json_backend needs host, /path and key header",
            ));
        }
    }
    Ok(())
}

impl ConfigPort for NvsAdapter {
    fn load(&self) -> Result<DeviceConfig, ConfigError> {
        #[cfg(not(target_os = "espidf"))]
        {
            if let Some(bytes) = self.store.borrow().get(&Self::composite_key()) {
                let cfg: DeviceConfig =
                    postcard::from_bytes(bytes).map_err(|_| ConfigError::Corrupted)?;
                info!("NvsAdapter: loaded config from store");
                Ok(cfg)
            } else {
                info!("NvsAdapter: no stored config, using defaults");
                Ok(DeviceConfig::default())
            }
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(false, |handle| {
                let key_cstr = b"devcfg\0";
                let mut size: usize = 0;

                let ret = unsafe {
                    nvs_get_blob(
                        handle,
                        key_cstr.as_ptr() as *const _,
                        core::ptr::null_mut(),
                        &mut size,
                    )
                };
                if ret == ESP_ERR_NVS_NOT_FOUND {
                    return Err(ESP_ERR_NVS_NOT_FOUND);
                }
                if ret != ESP_OK || size == 0 || size > MAX_BLOB_SIZE {
                    return Err(ret);
                }

                let mut buf = vec![0u8; size];
                let ret = unsafe {
                    nvs_get_blob(
                        handle,
                        key_cstr.as_ptr() as *const _,
                        buf.as_mut_ptr() as *mut _,
                        &mut size,
                    )
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(buf)
            });

            match result {
                Ok(bytes) => {
                    let cfg: DeviceConfig =
                        postcard::from_bytes(&bytes).map_err(|_| ConfigError::Corrupted)?;
                    info!("NvsAdapter: loaded config from NVS ({} bytes)", bytes.len());
                    Ok(cfg)
                }
                Err(e) if e == ESP_ERR_NVS_NOT_FOUND => {
                    info!("NvsAdapter: no stored config, using defaults");
                    Ok(DeviceConfig::default())
                }
                Err(e) => {
                    warn!("NvsAdapter: NVS read error {}, using defaults", e);
                    Ok(DeviceConfig::default())
                }
            }
        }
    }

    fn save(&self, config: &DeviceConfig) -> Result<(), ConfigError> {
        validate_config(config)?;
        let bytes = postcard::to_allocvec(config).map_err(|_| ConfigError::IoError)?;

        #[cfg(not(target_os = "espidf"))]
        {
            self.store.borrow_mut().insert(Self::composite_key(), bytes);
            info!("NvsAdapter: config saved (simulation)");
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(true, |handle| {
                let key_cstr = b"devcfg\0";
                let ret = unsafe {
                    nvs_set_blob(
                        handle,
                        key_cstr.as_ptr() as *const _,
                        bytes.as_ptr() as *const _,
                        bytes.len(),
                    )
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                let ret = unsafe { nvs_commit(handle) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(())
            });
            match result {
                Ok(()) => {
                    info!("NvsAdapter: config saved to NVS ({} bytes)", bytes.len());
                    Ok(())
                }
                Err(e) => {
                    warn!("NvsAdapter: NVS write error {}", e);
                    Err(ConfigError::IoError)
                }
            }
        }
    }
}
