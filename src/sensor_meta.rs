//! Sensor-type metadata table and boundary coercion
//!
//! Remote payloads carry sensor types as numeric codes, numeric strings or
//! display labels depending on which client wrote them. Everything entering
//! the crate is normalized to a numeric code here.

use serde_json::Value;

/// Display metadata for one sensor type code
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorMetadata {
    pub code: u16,
    pub name: &'static str,
    pub unit: &'static str,
    pub icon: &'static str,
    pub color: &'static str,
    pub value_labels: &'static [&'static str],
    /// Chip or legacy names that map onto this code
    pub aliases: &'static [&'static str],
}

/// Fallback for codes missing from the table
pub const GENERIC: SensorMetadata = SensorMetadata {
    code: 0,
    name: "Sensor",
    unit: "",
    icon: "generic.png",
    color: "#6b7280",
    value_labels: &[],
    aliases: &[],
};

static TABLE: &[SensorMetadata] = &[
    SensorMetadata {
        code: 0,
        name: "Unknown",
        unit: "",
        icon: "unknown.png",
        color: "#6b7280",
        value_labels: &[],
        aliases: &["NONE"],
    },
    SensorMetadata {
        code: 1,
        name: "Temperature/Humidity",
        unit: "°C, %",
        icon: "thermometer.png",
        color: "#2563eb",
        value_labels: &["Temperature (°C)", "Humidity (%)"],
        aliases: &["SHT20", "TEMP_HUMIDITY"],
    },
    SensorMetadata {
        code: 2,
        name: "Light",
        unit: "lux",
        icon: "sun.png",
        color: "#d97706",
        value_labels: &["Illuminance (lux)"],
        aliases: &["BH1750", "LIGHT"],
    },
    SensorMetadata {
        code: 3,
        name: "Nutrient Solution",
        unit: "pH, dS/m",
        icon: "ph.png",
        color: "#7c3aed",
        value_labels: &["Solution pH", "Solution EC (dS/m)"],
        aliases: &["ADS1115"],
    },
    SensorMetadata {
        code: 4,
        name: "CO2",
        unit: "ppm",
        icon: "air.png",
        color: "#16a34a",
        value_labels: &["CO2 (ppm)"],
        aliases: &["SCD30", "CO2_SENSOR"],
    },
    SensorMetadata {
        code: 5,
        name: "Temperature",
        unit: "°C",
        icon: "thermometer.png",
        color: "#dc2626",
        value_labels: &["Temperature (°C)"],
        aliases: &["DS18B20", "TEMPERATURE"],
    },
    SensorMetadata {
        code: 11,
        name: "Modbus Temperature/Humidity",
        unit: "°C, %",
        icon: "thermometer.png",
        color: "#2563eb",
        value_labels: &["Temperature (°C)", "Humidity (%)"],
        aliases: &["MODBUS_TH"],
    },
    SensorMetadata {
        code: 12,
        name: "Modbus Pressure",
        unit: "bar",
        icon: "press.png",
        color: "#8b5cf6",
        value_labels: &["Pressure (bar)"],
        aliases: &["MODBUS_PRESSURE"],
    },
    SensorMetadata {
        code: 13,
        name: "Modbus Flow",
        unit: "L/min",
        icon: "water.png",
        color: "#06b6d4",
        value_labels: &["Flow (L/min)"],
        aliases: &["MODBUS_FLOW"],
    },
    SensorMetadata {
        code: 14,
        name: "Modbus Relay",
        unit: "",
        icon: "power.png",
        color: "#ef4444",
        value_labels: &["State"],
        aliases: &["MODBUS_RELAY"],
    },
    SensorMetadata {
        code: 15,
        name: "Modbus Power",
        unit: "V, A",
        icon: "power.png",
        color: "#f59e0b",
        value_labels: &["Voltage (V)", "Current (A)"],
        aliases: &["MODBUS_ENERGY"],
    },
    SensorMetadata {
        code: 16,
        name: "Wind Direction",
        unit: "°",
        icon: "direction.png",
        color: "#10b981",
        value_labels: &["Gear direction", "Angle (°)", "Direction"],
        aliases: &["WIND_DIRECTION"],
    },
    SensorMetadata {
        code: 17,
        name: "Wind Speed",
        unit: "m/s",
        icon: "air.png",
        color: "#3b82f6",
        value_labels: &["Wind speed (m/s)", "Beaufort scale", "State"],
        aliases: &["WIND_SPEED"],
    },
    SensorMetadata {
        code: 18,
        name: "Rain/Snow",
        unit: "°C, %, level",
        icon: "cloud.png",
        color: "#6366f1",
        value_labels: &[
            "Precipitation",
            "Precipitation text",
            "Moisture level",
            "Moisture intensity",
            "Temperature (°C)",
            "Humidity (%)",
            "Temperature state",
            "Icon",
        ],
        aliases: &["RAIN"],
    },
    SensorMetadata {
        code: 19,
        name: "Soil",
        unit: "pH, dS/m, °C, %",
        icon: "soil.png",
        color: "#84cc16",
        value_labels: &["Soil pH", "Soil EC (dS/m)", "Soil temperature (°C)", "Soil moisture (%)"],
        aliases: &["SOIL"],
    },
    SensorMetadata {
        code: 21,
        name: "SHT20 (Modbus)",
        unit: "°C, %",
        icon: "thermometer.png",
        color: "#2563eb",
        value_labels: &["Temperature (°C)", "Humidity (%)"],
        aliases: &["MODBUS_SHT20"],
    },
];

/// Metadata for a type code, falling back to [`GENERIC`]
pub fn metadata_for(code: u16) -> &'static SensorMetadata {
    TABLE.iter().find(|m| m.code == code).unwrap_or(&GENERIC)
}

/// Resolve a display label or alias to its code
pub fn code_for_label(label: &str) -> Option<u16> {
    let label = label.trim();
    TABLE
        .iter()
        .find(|m| {
            m.name.eq_ignore_ascii_case(label) || m.aliases.iter().any(|a| a.eq_ignore_ascii_case(label))
        })
        .map(|m| m.code)
}

/// Display label for a code; unknown codes get a synthesized label
pub fn label_for_code(code: u16) -> String {
    match TABLE.iter().find(|m| m.code == code) {
        Some(meta) => meta.name.to_string(),
        None => format!("Sensor {code}"),
    }
}

/// Normalize a sensor type coming from any client into a numeric code.
///
/// Numbers pass through, numeric strings are parsed, labels are looked up in
/// the table; anything else becomes 0.
pub fn coerce_sensor_type(value: &Value) -> u16 {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite() && *f >= 0.0).map(|f| f as u64))
            .and_then(|v| u16::try_from(v).ok())
            .unwrap_or(0),
        Value::String(s) => coerce_sensor_label(s),
        _ => 0,
    }
}

/// String half of [`coerce_sensor_type`]
pub fn coerce_sensor_label(label: &str) -> u16 {
    let trimmed = label.trim();
    if let Ok(code) = trimmed.parse::<u16>() {
        return code;
    }
    if let Some(code) = leading_integer(trimmed) {
        return code;
    }
    code_for_label(trimmed).unwrap_or(0)
}

/// `parseInt`-style prefix parse ("12abc" -> 12)
fn leading_integer(s: &str) -> Option<u16> {
    let digits: String = s.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        None
    } else {
        digits.parse().ok()
    }
}

/// Defensive numeric coercion for loosely-typed payload fields.
///
/// Finite numbers and numeric strings pass; everything else is 0.
pub fn coerce_number(value: &Value) -> f64 {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(true) => Some(1.0),
        _ => None,
    };
    parsed.filter(|v| v.is_finite()).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_coercion_equivalent_across_input_forms() {
        assert_eq!(coerce_sensor_type(&json!(4)), 4);
        assert_eq!(coerce_sensor_type(&json!("4")), 4);
        assert_eq!(coerce_sensor_type(&json!("CO2")), 4);
        assert_eq!(coerce_sensor_type(&json!("SCD30")), 4);
    }

    #[test]
    fn test_coercion_unknown_inputs_become_zero() {
        assert_eq!(coerce_sensor_type(&json!("mystery")), 0);
        assert_eq!(coerce_sensor_type(&json!(null)), 0);
        assert_eq!(coerce_sensor_type(&json!(-3)), 0);
        assert_eq!(coerce_sensor_type(&json!([1, 2])), 0);
    }

    #[test]
    fn test_label_round_trip() {
        for code in [1u16, 2, 5, 11, 19, 21] {
            assert_eq!(coerce_sensor_label(&label_for_code(code)), code);
        }
        assert_eq!(label_for_code(99), "Sensor 99");
    }

    #[test]
    fn test_unknown_code_uses_generic_metadata() {
        let meta = metadata_for(77);
        assert_eq!(meta.name, GENERIC.name);
        assert_eq!(meta.icon, GENERIC.icon);
        assert_eq!(meta.unit, "");
    }

    #[test]
    fn test_coerce_number() {
        assert_eq!(coerce_number(&json!(12.5)), 12.5);
        assert_eq!(coerce_number(&json!("33.3")), 33.3);
        assert_eq!(coerce_number(&json!("garbled")), 0.0);
        assert_eq!(coerce_number(&json!(null)), 0.0);
        assert_eq!(coerce_number(&json!({})), 0.0);
    }
}
