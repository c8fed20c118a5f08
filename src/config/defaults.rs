use super::*;

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "voltaic".to_string(),
            keep_alive_secs: 30,
            username: None,
            password: None,
            reconnect_initial_ms: 1000,
            reconnect_max_ms: 60_000,
        }
    }
}

impl Default for TopicsConfig {
    fn default() -> Self {
        Self {
            grid_export: "vzlogger/data/chn2/raw".to_string(),
            pv_input: "emon/NodeHuawei/input_power".to_string(),
            battery_soc: "emon/NodeHuawei/storage_state_of_capacity".to_string(),
            battery_power: "emon/NodeHuawei/storage_charge_discharge_power".to_string(),
            wallbox_state: "homie/Heidelberg-Wallbox/$state".to_string(),
            wallbox_consumption: "homie/Heidelberg-Wallbox/wallbox/charging_power".to_string(),
            set_current: "homie/Heidelberg-Wallbox/wallbox/max_current/set".to_string(),
        }
    }
}

impl Default for ModeLabelsConfig {
    fn default() -> Self {
        Self {
            off: "Aus".to_string(),
            max_charge: "Max Charge".to_string(),
            min_charge: "Min Charge".to_string(),
            protect_battery: "Protect Battery".to_string(),
            pv_prefer_battery: "PV Charge (Prefer Battery)".to_string(),
            pv_prefer_charge: "PV Charge (Prefer Charge)".to_string(),
        }
    }
}

impl Default for HomeAssistantConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            token: String::new(),
            mode_entity: "input_select.wallbox_charge_mode".to_string(),
            timeout_secs: 10,
            fallback_label: "Aus".to_string(),
            mode_labels: ModeLabelsConfig::default(),
        }
    }
}

impl Default for RegulationConfig {
    fn default() -> Self {
        Self {
            min_current: 6,
            max_current: 16,
            volts_per_phase: 230.0,
            pv_warmup_samples: 4,
            pv_surplus_threshold_w: 1400.0,
            battery_full_soc: 98.5,
            battery_resume_soc: 95.0,
            start_export_threshold_w: 1380.0,
            ramp_up_export_w: 400.0,
            ramp_up_battery_w: 400.0,
            ramp_down_import_w: 50.0,
            protect_battery_max_soc: 2.0,
            protect_battery_max_power_w: 10.0,
            idle_interval_secs: 30,
            pv_interval_secs: 20,
            settle_secs: 5,
            confirm_timeout_secs: 60,
            confirm_poll_interval_secs: 2,
            await_charging_start: true,
            await_ramp_feedback: true,
            window_capacity: 10,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            file: "/tmp/voltaic/voltaic.log".to_string(),
            backup_count: 14,
            console_output: true,
            json_format: false,
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 8089,
        }
    }
}
