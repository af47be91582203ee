//! 应用运行配置加载。

use std::env;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env: {0}")]
    Missing(String),
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
}

/// 应用运行配置。
///
/// 一次性从环境变量读取，启动后对核心只读。
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_username: Option<String>,
    pub mqtt_password: Option<String>,
    pub target_host: String,
    pub start_port: u16,
    pub end_port: u16,
    pub report_interval_seconds: u64,
    pub connect_retries: u32,
    pub send_retries: u32,
    pub socket_timeout_seconds: u64,
    pub reading_path: String,
    pub config_blob_path: String,
    pub station_type: String,
    pub station_number: String,
    pub query_config_topic: String,
    pub probe_topics: Vec<String>,
    pub config_topic: String,
    pub analog_topic: String,
}

impl AgentConfig {
    /// 从环境变量读取配置。
    pub fn from_env() -> Result<Self, ConfigError> {
        let station_type = env::var("VACMON_STATION_TYPE")
            .map_err(|_| ConfigError::Missing("VACMON_STATION_TYPE".to_string()))?;
        let station_number = env::var("VACMON_STATION_NUMBER")
            .map_err(|_| ConfigError::Missing("VACMON_STATION_NUMBER".to_string()))?;

        let mqtt_host = env::var("VACMON_MQTT_HOST").unwrap_or_else(|_| "10.0.1.200".to_string());
        let mqtt_port = read_u16_with_default("VACMON_MQTT_PORT", 1883)?;
        let mqtt_username = read_optional("VACMON_MQTT_USERNAME");
        let mqtt_password = read_optional("VACMON_MQTT_PASSWORD");

        let target_host =
            env::var("VACMON_TARGET_HOST").unwrap_or_else(|_| "10.0.1.202".to_string());
        let start_port = read_u16_with_default("VACMON_START_PORT", 4096)?;
        let end_port = read_u16_with_default("VACMON_END_PORT", 4101)?;
        if end_port < start_port {
            return Err(ConfigError::Invalid(
                "VACMON_END_PORT".to_string(),
                format!("{} < {}", end_port, start_port),
            ));
        }

        let report_interval_seconds =
            read_u64_with_default("VACMON_REPORT_INTERVAL_SECONDS", 5)?;
        let connect_retries = read_u32_with_default("VACMON_CONNECT_RETRIES", 3)?;
        let send_retries = read_u32_with_default("VACMON_SEND_RETRIES", 3)?;
        let socket_timeout_seconds = read_u64_with_default("VACMON_SOCKET_TIMEOUT_SECONDS", 3)?;

        let reading_path =
            env::var("VACMON_READING_PATH").unwrap_or_else(|_| "Analog.json".to_string());
        let config_blob_path = env::var("VACMON_CONFIG_BLOB_PATH")
            .unwrap_or_else(|_| "Config2Send_Vacuum.json".to_string());

        let query_config_topic = env::var("VACMON_QUERY_CONFIG_TOPIC")
            .unwrap_or_else(|_| "/Devices/adc_agent/QueryConfig".to_string());
        let probe_topics = split_topics(
            &env::var("VACMON_PROBE_TOPICS").unwrap_or_else(|_| "/Test,/Try".to_string()),
        );
        if probe_topics.is_empty() {
            return Err(ConfigError::Invalid(
                "VACMON_PROBE_TOPICS".to_string(),
                "no topics".to_string(),
            ));
        }

        let component = station_component_id(&station_type, &station_number);
        let config_topic = format!("/Devices/{}/VacuumMonitor/Config", component);
        let analog_topic = format!("/Devices/{}/VacuumMonitor/Analog", component);

        Ok(Self {
            mqtt_host,
            mqtt_port,
            mqtt_username,
            mqtt_password,
            target_host,
            start_port,
            end_port,
            report_interval_seconds,
            connect_retries,
            send_retries,
            socket_timeout_seconds,
            reading_path,
            config_blob_path,
            station_type,
            station_number,
            query_config_topic,
            probe_topics,
            config_topic,
            analog_topic,
        })
    }
}

/// 工位主组件标识。
///
/// QT-BCM2 与 BOOT-ARGS 两类工位不携带工位编号后缀。
pub fn station_component_id(station_type: &str, station_number: &str) -> String {
    if station_type == "QT-BCM2" || station_type == "BOOT-ARGS" {
        format!("work_station_{}", station_type)
    } else {
        format!("work_station_{}_{}", station_type, station_number)
    }
}

fn split_topics(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|topic| !topic.is_empty())
        .map(str::to_string)
        .collect()
}

fn read_u16_with_default(key: &str, default: u16) -> Result<u16, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u16>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_u32_with_default(key: &str, default: u32) -> Result<u32, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u32>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_u64_with_default(key: &str, default: u64) -> Result<u64, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u64>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_optional(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => None,
    }
}
