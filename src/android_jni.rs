//! JNI bindings for `com.example.android.camera2video.SensorLogger`.
//!
//! The activity owns one logger through the opaque `long` handle returned by
//! `nativeCreate` and releases it with `nativeDestroy`. Sensor and location
//! callbacks may arrive on a looper thread other than the UI thread, so each
//! logger sits behind a mutex.
//!
//! Lifecycle calls throw Java exceptions on failure. Sensor and location
//! callbacks never throw: a failed sample is logged and dropped so the host
//! keeps running.

use crate::config::LoggerConfig;
use crate::error::{throw_java_exception, LogResult, SensorLogError};
use crate::sensor_receiver::{LocationSample, SensorEvent, SensorKind, SensorSample};
use crate::session::SensorLogger;
use crate::storage::DeviceInfo;
use jni::objects::{JClass, JFloatArray, JString};
use jni::sys::{jdouble, jint, jintArray, jlong, jstring};
use jni::JNIEnv;
use std::sync::{Mutex, Once};

type LoggerHandle = Mutex<SensorLogger>;

const LOG_TAG: &str = "SensorLogger";

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        #[cfg(target_os = "android")]
        if android_log::init(LOG_TAG).is_err() {
            eprintln!("[{}] logger already initialized", LOG_TAG);
        }
    });
}

/// Run `f` against the logger behind `handle`
fn with_logger<R>(
    handle: jlong,
    f: impl FnOnce(&mut SensorLogger) -> LogResult<R>,
) -> LogResult<R> {
    if handle == 0 {
        return Err(SensorLogError::Internal("Null logger handle".to_string()));
    }

    // SAFETY: non-zero handles come from `nativeCreate` and stay valid until
    // `nativeDestroy`, after which the host must not use them.
    let cell = unsafe { &*(handle as *const LoggerHandle) };
    let mut logger = cell
        .lock()
        .map_err(|_| SensorLogError::Internal("Failed to acquire logger lock".to_string()))?;
    f(&mut logger)
}

fn java_string(env: &mut JNIEnv, s: &JString) -> LogResult<String> {
    if s.is_null() {
        return Ok(String::new());
    }
    Ok(env.get_string(s)?.into())
}

/// Map a lifecycle result to the 0 / -1 convention, throwing on error
fn status_or_throw(env: &mut JNIEnv, result: LogResult<()>) -> jint {
    match result {
        Ok(()) => 0,
        Err(e) => {
            let _ = throw_java_exception(env, &e);
            -1
        }
    }
}

/// Map a callback result to 0 / -1 without throwing
fn status_or_log(result: LogResult<()>, what: &str) -> jint {
    match result {
        Ok(()) => 0,
        Err(e) => {
            log::warn!("Dropped {}: {}", what, e);
            -1
        }
    }
}

/// JNI: Create a logger from a JSON config (null or empty = defaults)
/// Returns: handle, or 0 on error (throws Java exception)
#[no_mangle]
pub extern "C" fn Java_com_example_android_camera2video_SensorLogger_nativeCreate(
    mut env: JNIEnv,
    _class: JClass,
    config_json: JString,
) -> jlong {
    init_logging();

    let result = java_string(&mut env, &config_json).and_then(|json| LoggerConfig::from_json(&json));
    match result {
        Ok(config) => {
            log::info!("Created with sensors {:?}", config.enabled_sensors);
            let handle: Box<LoggerHandle> = Box::new(Mutex::new(SensorLogger::new(config)));
            Box::into_raw(handle) as jlong
        }
        Err(e) => {
            let _ = throw_java_exception(&mut env, &e);
            0
        }
    }
}

/// JNI: Destroy a logger, closing its file if still logging
#[no_mangle]
pub extern "C" fn Java_com_example_android_camera2video_SensorLogger_nativeDestroy(
    _env: JNIEnv,
    _class: JClass,
    handle: jlong,
) {
    if handle == 0 {
        return;
    }

    // SAFETY: handle came from `Box::into_raw` in `nativeCreate` and is destroyed once
    let cell = *unsafe { Box::from_raw(handle as *mut LoggerHandle) };
    if let Ok(mut logger) = cell.into_inner() {
        if logger.is_logging() {
            if let Err(e) = logger.stop() {
                log::error!("Stop on destroy failed: {}", e);
            }
        }
    }
}

/// JNI: Start logging to `<pathBase>.csv`
/// Returns: 0 on success, -1 on error (throws Java exception)
#[no_mangle]
pub extern "C" fn Java_com_example_android_camera2video_SensorLogger_startLogging(
    mut env: JNIEnv,
    _class: JClass,
    handle: jlong,
    path_base: JString,
    device_info_json: JString,
) -> jint {
    let result = start_logging_impl(&mut env, handle, &path_base, &device_info_json);
    status_or_throw(&mut env, result)
}

fn start_logging_impl(
    env: &mut JNIEnv,
    handle: jlong,
    path_base: &JString,
    device_info_json: &JString,
) -> LogResult<()> {
    let path_base = java_string(env, path_base)?;
    if path_base.is_empty() {
        return Err(SensorLogError::Config("Empty log path".to_string()));
    }
    let device = DeviceInfo::from_json(&java_string(env, device_info_json)?)?;

    with_logger(handle, |logger| logger.start(&path_base, &device))
}

/// JNI: Stop logging; a no-op when not logging
/// Returns: 0 on success, -1 on error (throws Java exception)
#[no_mangle]
pub extern "C" fn Java_com_example_android_camera2video_SensorLogger_stopLogging(
    mut env: JNIEnv,
    _class: JClass,
    handle: jlong,
) -> jint {
    let result = with_logger(handle, |logger| match logger.stop() {
        Ok(_) => Ok(()),
        Err(SensorLogError::NotLogging) => {
            log::warn!("stopLogging called while not logging");
            Ok(())
        }
        Err(e) => Err(e),
    });
    status_or_throw(&mut env, result)
}

/// JNI: Write a marker line (the host plays the tone)
/// Returns: 0 on success, -1 on error
#[no_mangle]
pub extern "C" fn Java_com_example_android_camera2video_SensorLogger_logEvent(
    mut env: JNIEnv,
    _class: JClass,
    handle: jlong,
    text: JString,
) -> jint {
    let result = java_string(&mut env, &text).and_then(|text| {
        with_logger(handle, |logger| {
            logger.log_event(&text);
            Ok(())
        })
    });
    status_or_log(result, "marker")
}

/// JNI: Forward `SensorEventListener.onSensorChanged`
/// Parameters: Android `Sensor.TYPE_*` id, `event.values`
/// Returns: 0 on success or ignored sensor, -1 on error
#[no_mangle]
pub extern "C" fn Java_com_example_android_camera2video_SensorLogger_onSensorChanged(
    mut env: JNIEnv,
    _class: JClass,
    handle: jlong,
    sensor_type: jint,
    values: JFloatArray,
) -> jint {
    let result = on_sensor_changed_impl(&mut env, handle, sensor_type, &values);
    status_or_log(result, "sensor sample")
}

fn on_sensor_changed_impl(
    env: &mut JNIEnv,
    handle: jlong,
    sensor_type: jint,
    values: &JFloatArray,
) -> LogResult<()> {
    let Some(kind) = SensorKind::from_android_type(sensor_type) else {
        log::debug!("Ignoring sensor type {}", sensor_type);
        return Ok(());
    };

    let len = env.get_array_length(values)?;
    let mut buf = vec![0.0f32; len.max(0) as usize];
    env.get_float_array_region(values, 0, &mut buf)?;

    let sample = SensorSample::new(kind, &buf)?;
    with_logger(handle, |logger| {
        logger.handle_event(&SensorEvent::Sensor(sample));
        Ok(())
    })
}

/// JNI: Forward `LocationListener.onLocationChanged`
/// Returns: 0 on success, -1 on error
#[no_mangle]
pub extern "C" fn Java_com_example_android_camera2video_SensorLogger_onLocationChanged(
    _env: JNIEnv,
    _class: JClass,
    handle: jlong,
    latitude: jdouble,
    longitude: jdouble,
) -> jint {
    let result = with_logger(handle, |logger| {
        logger.handle_event(&SensorEvent::Location(LocationSample::new(latitude, longitude)));
        Ok(())
    });
    status_or_log(result, "location")
}

/// JNI: Forward `LocationListener.onProviderEnabled`
#[no_mangle]
pub extern "C" fn Java_com_example_android_camera2video_SensorLogger_onProviderEnabled(
    mut env: JNIEnv,
    _class: JClass,
    handle: jlong,
    provider: JString,
) {
    let result = java_string(&mut env, &provider).and_then(|provider| {
        with_logger(handle, |logger| {
            logger.handle_event(&SensorEvent::ProviderEnabled { provider });
            Ok(())
        })
    });
    status_or_log(result, "provider notice");
}

/// JNI: Forward `LocationListener.onProviderDisabled`
#[no_mangle]
pub extern "C" fn Java_com_example_android_camera2video_SensorLogger_onProviderDisabled(
    mut env: JNIEnv,
    _class: JClass,
    handle: jlong,
    provider: JString,
) {
    let result = java_string(&mut env, &provider).and_then(|provider| {
        with_logger(handle, |logger| {
            logger.handle_event(&SensorEvent::ProviderDisabled { provider });
            Ok(())
        })
    });
    status_or_log(result, "provider notice");
}

/// JNI: Sensor type ids to register on resume and unregister on pause
/// Returns: jintArray, or null on error (throws Java exception)
#[no_mangle]
pub extern "C" fn Java_com_example_android_camera2video_SensorLogger_enabledSensorTypes(
    mut env: JNIEnv,
    _class: JClass,
    handle: jlong,
) -> jintArray {
    let result = with_logger(handle, |logger| Ok(logger.config().registrations()))
        .and_then(|types| {
            let arr = env.new_int_array(types.len() as i32)?;
            env.set_int_array_region(&arr, 0, &types)?;
            Ok(arr)
        });

    match result {
        Ok(arr) => arr.into_raw(),
        Err(e) => {
            let _ = throw_java_exception(&mut env, &e);
            std::ptr::null_mut()
        }
    }
}

/// JNI: Logger config as JSON (sampling period and GPS request parameters for registration)
/// Returns: JSON string, or null on error (throws Java exception)
#[no_mangle]
pub extern "C" fn Java_com_example_android_camera2video_SensorLogger_getConfig(
    mut env: JNIEnv,
    _class: JClass,
    handle: jlong,
) -> jstring {
    let result = with_logger(handle, |logger| Ok(serde_json::to_string(logger.config())?));
    json_or_throw(&mut env, result.map(Some))
}

/// JNI: Stats of the running session, or of the last one
/// Returns: JSON string, null if never started
#[no_mangle]
pub extern "C" fn Java_com_example_android_camera2video_SensorLogger_getSessionStats(
    mut env: JNIEnv,
    _class: JClass,
    handle: jlong,
) -> jstring {
    let result = with_logger(handle, |logger| {
        logger
            .stats()
            .map(|stats| serde_json::to_string(&stats))
            .transpose()
            .map_err(|e| SensorLogError::Internal(format!("JSON serialization failed: {}", e)))
    });
    json_or_throw(&mut env, result)
}

fn json_or_throw(env: &mut JNIEnv, result: LogResult<Option<String>>) -> jstring {
    match result {
        Ok(Some(json)) => match env.new_string(&json) {
            Ok(jstr) => jstr.into_raw(),
            Err(_) => {
                let _ = throw_java_exception(
                    env,
                    &SensorLogError::JniError("Failed to create Java string".to_string()),
                );
                std::ptr::null_mut()
            }
        },
        Ok(None) => std::ptr::null_mut(),
        Err(e) => {
            let _ = throw_java_exception(env, &e);
            std::ptr::null_mut()
        }
    }
}
