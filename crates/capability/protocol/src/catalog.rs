//! Dachs GLT 寄存器表
//!
//! 读表（FC=04 输入寄存器）与写表（FC=06 单寄存器写）是两个独立命名空间，
//! 构造时统一校验，之后只读。

use crate::error::ProtocolError;
use crate::types::{Access, RawType, RegisterFormat, RegisterSpec};
use std::collections::{BTreeSet, HashMap, HashSet};

/// 心跳 PIN 寄存器（8300）
pub const HEARTBEAT_PIN_KEY: &str = "glt_pin";
/// 电功率设定值寄存器（8301，10 W/计数）
pub const ELECTRICAL_SETPOINT_KEY: &str = "electrical_setpoint";
/// 锁定标志寄存器（8302，0/1）
pub const LOCKED_KEY: &str = "locked";

/// 单个寄存器最多占用的字数（U64）
pub const MAX_WORD_COUNT: u16 = 4;

/// 默认"快速"轮询集合
pub const FAST_KEYS: &[&str] = &[
    "plant_status",
    "op_hours_total_h",
    "electrical_power_kw",
    "energy_el_total_kwh",
    "energy_th_total_kwh",
    "outdoor_temp_c",
    "temp_out_c",
    "temp_in_c",
    "buffer_t1_c",
    "buffer_t2_c",
    "buffer_t3_c",
    "buffer_t4_c",
    "last_shutdown_reason",
    "request_type",
];

/// 实测不能与相邻地址合并读取的状态/枚举寄存器
pub const DACHS_NO_MERGE: &[u16] = &[8015, 8016, 8017];

type Row = (&'static str, u16, u16, RawType, &'static str);

const DACHS_READ: &[Row] = &[
    // 设备档案 8000..8012
    ("glt_version", 8000, 1, RawType::U16, "RAW"),
    ("device_type", 8001, 1, RawType::U16, "ENUM"),
    ("serial_1_2", 8002, 1, RawType::U16, "RAW"),
    ("serial_3_4", 8003, 1, RawType::U16, "RAW"),
    ("serial_5_6", 8004, 1, RawType::U16, "RAW"),
    ("serial_7_8", 8005, 1, RawType::U16, "RAW"),
    ("serial_9_10", 8006, 1, RawType::U16, "RAW"),
    ("serial_11_12", 8007, 1, RawType::U16, "RAW"),
    ("serial_13_14", 8008, 1, RawType::U16, "RAW"),
    ("serial_15_16", 8009, 1, RawType::U16, "RAW"),
    ("serial_17_18", 8010, 1, RawType::U16, "RAW"),
    ("serial_19_20", 8011, 1, RawType::U16, "RAW"),
    ("module_nominal_power_kw", 8012, 1, RawType::U16, "FIX1"),
    // 设备状态 8013..8020
    ("plant_status", 8013, 1, RawType::U16, "ENUM"),
    ("electrical_power_kw", 8014, 1, RawType::S16, "FIX1"),
    ("request_type", 8015, 1, RawType::U16, "ENUM"),
    ("runtime_since_start_h", 8016, 1, RawType::U16, "FIX1"),
    ("last_shutdown_reason", 8017, 1, RawType::U16, "ENUM"),
    ("pump_status", 8018, 1, RawType::U16, "ENUM"),
    ("temp_out_c", 8019, 1, RawType::U16, "TEMP"),
    ("temp_in_c", 8020, 1, RawType::U16, "TEMP"),
    // 设备配置 8021..8026
    ("lead_quantity", 8021, 1, RawType::U16, "ENUM"),
    ("min_runtime_min", 8022, 1, RawType::U16, "FIX0"),
    ("max_inlet_temp_c", 8023, 1, RawType::S16, "TEMP"),
    ("modulation_enabled", 8024, 1, RawType::U16, "ENUM"),
    ("fixed_stage_level", 8025, 1, RawType::U16, "FIX0"),
    ("module_type", 8026, 1, RawType::U16, "ENUM"),
    // 运行数据 8027..8040
    ("op_hours_total_h", 8027, 2, RawType::U32, "FIX0"),
    ("start_count", 8029, 2, RawType::U32, "FIX0"),
    ("energy_el_total_kwh", 8031, 2, RawType::U32, "FIX1"),
    ("energy_th_total_kwh", 8033, 2, RawType::U32, "FIX1"),
    ("op_hours_stage1_h", 8035, 2, RawType::U32, "FIX0"),
    ("op_hours_stage2_h", 8037, 2, RawType::U32, "FIX0"),
    ("op_hours_stage3_h", 8039, 2, RawType::U32, "FIX0"),
    // 系统数据 8041..8056
    ("outdoor_temp_c", 8041, 1, RawType::S16, "TEMP"),
    ("buffer_t1_c", 8042, 1, RawType::S16, "TEMP"),
    ("buffer_t2_c", 8043, 1, RawType::S16, "TEMP"),
    ("buffer_t3_c", 8044, 1, RawType::S16, "TEMP"),
    ("buffer_t4_c", 8045, 1, RawType::S16, "TEMP"),
    ("buffer_t5_c", 8046, 1, RawType::S16, "TEMP"),
    ("buffer_t6_c", 8047, 1, RawType::S16, "TEMP"),
    ("sensor1_c", 8048, 1, RawType::S16, "TEMP"),
    ("sensor2_c", 8049, 1, RawType::S16, "TEMP"),
    ("sensor3_c", 8050, 1, RawType::S16, "TEMP"),
    ("sensor4_c", 8051, 1, RawType::S16, "TEMP"),
    ("sensor5_c", 8052, 1, RawType::S16, "TEMP"),
    ("sensor6_c", 8053, 1, RawType::S16, "TEMP"),
    ("sensor7_c", 8054, 1, RawType::S16, "TEMP"),
    ("sensor8_c", 8055, 1, RawType::S16, "TEMP"),
    ("discharge_power_pct", 8056, 1, RawType::U16, "FIX0"),
    // 储热罐配置 8057..8065
    ("buffer_type", 8057, 1, RawType::U16, "ENUM"),
    ("buffer_volume_l", 8058, 1, RawType::U16, "FIX0"),
    ("buffer_sensor_config", 8059, 1, RawType::U16, "ENUM"),
    ("buffer_pos1_pct", 8060, 1, RawType::U16, "FIX0"),
    ("buffer_pos2_pct", 8061, 1, RawType::U16, "FIX0"),
    ("buffer_pos3_pct", 8062, 1, RawType::U16, "FIX0"),
    ("buffer_pos4_pct", 8063, 1, RawType::U16, "FIX0"),
    ("heat_provisioning", 8064, 1, RawType::U16, "ENUM"),
    ("buffer_discharge_enabled", 8065, 1, RawType::U16, "ENUM"),
    // 多模块 8066..8072
    ("mm_active_power_kw", 8066, 1, RawType::U16, "FIX1"),
    ("mm_modules_detected", 8067, 1, RawType::U16, "FIX0"),
    ("mm_modules_available", 8068, 1, RawType::U16, "FIX0"),
    ("mm_modules_requested", 8069, 1, RawType::U16, "FIX0"),
    ("mm_modules_running", 8070, 1, RawType::U16, "FIX0"),
    ("mm_modules_configured", 8071, 1, RawType::U16, "FIX0"),
    ("mm_nominal_power_kw", 8072, 1, RawType::U16, "FIX1"),
    // 第二热源 8073..8083
    ("we2_status", 8073, 1, RawType::U16, "ENUM"),
    ("we2_set_status", 8074, 1, RawType::U16, "ENUM"),
    ("we2_start_count", 8075, 2, RawType::U32, "FIX0"),
    ("we2_op_hours_h", 8077, 2, RawType::U32, "FIX0"),
    ("we2_available", 8079, 1, RawType::U16, "ENUM"),
    ("we2_release", 8080, 1, RawType::U16, "ENUM"),
    ("we2_nominal_power_kw", 8081, 1, RawType::U16, "FIX1"),
    ("we2_min_runtime_min", 8082, 1, RawType::U16, "FIX0"),
    ("we2_connected_to_buffer", 8083, 1, RawType::U16, "ENUM"),
];

// 心跳需 < 10 min；8301 的修改设备每 5 min 才接受一次。
const DACHS_WRITE: &[Row] = &[
    (HEARTBEAT_PIN_KEY, 8300, 1, RawType::U16, "RAW"),
    (ELECTRICAL_SETPOINT_KEY, 8301, 1, RawType::U16, "FIX-DAW"),
    (LOCKED_KEY, 8302, 1, RawType::U16, "ENUM"),
];

// 早期集成使用的 key 名（单位大写、带 _enum/_bool 后缀），查找时映射到当前 key
const DACHS_LEGACY_KEYS: &[(&str, &str)] = &[
    ("module_nominal_power_kW", "module_nominal_power_kw"),
    ("plant_status_enum", "plant_status"),
    ("electrical_power_kW", "electrical_power_kw"),
    ("request_type_enum", "request_type"),
    ("last_shutdown_reason_enum", "last_shutdown_reason"),
    ("pump_status_enum", "pump_status"),
    ("temp_out_C", "temp_out_c"),
    ("temp_in_C", "temp_in_c"),
    ("lead_quantity_enum", "lead_quantity"),
    ("max_inlet_temp_C", "max_inlet_temp_c"),
    ("modulation_onoff", "modulation_enabled"),
    ("module_type_enum", "module_type"),
    ("energy_el_total_kWh", "energy_el_total_kwh"),
    ("energy_th_total_kWh", "energy_th_total_kwh"),
    ("outdoor_temp_C", "outdoor_temp_c"),
    ("buffer_T1_C", "buffer_t1_c"),
    ("buffer_T2_C", "buffer_t2_c"),
    ("buffer_T3_C", "buffer_t3_c"),
    ("buffer_T4_C", "buffer_t4_c"),
    ("buffer_T5_unused", "buffer_t5_c"),
    ("buffer_T6_unused", "buffer_t6_c"),
    ("sensor1_unused", "sensor1_c"),
    ("sensor2_unused", "sensor2_c"),
    ("sensor3_unused", "sensor3_c"),
    ("sensor4_unused", "sensor4_c"),
    ("temp_sensor5_C", "sensor5_c"),
    ("temp_sensor6_C", "sensor6_c"),
    ("temp_sensor7_C", "sensor7_c"),
    ("temp_sensor8_C", "sensor8_c"),
    ("buffer_type_enum", "buffer_type"),
    ("buffer_sensor_cfg_enum", "buffer_sensor_config"),
    ("heat_provisioning_enum", "heat_provisioning"),
    ("buffer_discharge_onoff", "buffer_discharge_enabled"),
    ("mm_active_power_kW", "mm_active_power_kw"),
    ("mm_nominal_power_kW", "mm_nominal_power_kw"),
    ("we2_status_enum", "we2_status"),
    ("we2_set_status_enum", "we2_set_status"),
    ("we2_available_bool", "we2_available"),
    ("we2_release_bool", "we2_release"),
    ("we2_nominal_power_kW", "we2_nominal_power_kw"),
    ("electrical_setpoint_W", ELECTRICAL_SETPOINT_KEY),
    ("bhkw_locked_bool", LOCKED_KEY),
];

const PLANT_STATUS_LABELS: &[(i64, &str)] = &[
    (0, "off"),
    (1, "standby"),
    (2, "running"),
    (3, "waiting"),
    (4, "fault"),
];

const REQUEST_TYPE_LABELS: &[(i64, &str)] = &[
    (0, "none"),
    (1, "minimum runtime"),
    (2, "emergency operation"),
    (3, "power demand"),
    (4, "heat demand"),
    (5, "hot water demand"),
    (6, "chimney sweep mode"),
];

const LAST_SHUTDOWN_REASON_LABELS: &[(i64, &str)] = &[
    (0, "undefined"),
    (1, "manual"),
    (2, "no demand"),
    (3, "fault"),
    (4, "inlet temperature too high"),
    (5, "24h shutdown"),
    (6, "cycling/standstill"),
    (7, "grid release"),
    (8, "clock release"),
    (9, "external release"),
    (10, "grid protection fault"),
    (11, "building management release"),
];

/// 枚举寄存器的可读标签。
pub fn enum_label(key: &str, raw: i64) -> Option<&'static str> {
    let labels = match key {
        "plant_status" => PLANT_STATUS_LABELS,
        "request_type" => REQUEST_TYPE_LABELS,
        "last_shutdown_reason" => LAST_SHUTDOWN_REASON_LABELS,
        _ => return None,
    };
    labels
        .iter()
        .find(|(value, _)| *value == raw)
        .map(|(_, label)| *label)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Namespace {
    Read,
    Write,
}

/// 寄存器表
#[derive(Debug, Clone)]
pub struct RegisterCatalog {
    read: Vec<RegisterSpec>,
    write: Vec<RegisterSpec>,
    index: HashMap<String, (Namespace, usize)>,
    no_merge: BTreeSet<u16>,
}

impl RegisterCatalog {
    /// 构造并校验寄存器表。
    pub fn new(
        read: Vec<RegisterSpec>,
        write: Vec<RegisterSpec>,
        no_merge: impl IntoIterator<Item = u16>,
    ) -> Result<Self, ProtocolError> {
        let mut index = HashMap::new();
        for (namespace, specs) in [(Namespace::Read, &read), (Namespace::Write, &write)] {
            for (position, spec) in specs.iter().enumerate() {
                if spec.word_count == 0 || spec.word_count > MAX_WORD_COUNT {
                    return Err(ProtocolError::InvalidCatalog(format!(
                        "{}: word count {} not in 1..={}",
                        spec.key, spec.word_count, MAX_WORD_COUNT
                    )));
                }
                if u32::from(spec.address) + u32::from(spec.word_count) > 0x1_0000 {
                    return Err(ProtocolError::InvalidCatalog(format!(
                        "{}: span exceeds address space",
                        spec.key
                    )));
                }
                if namespace == Namespace::Write && spec.word_count != 1 {
                    return Err(ProtocolError::InvalidCatalog(format!(
                        "{}: writable registers must be single-word",
                        spec.key
                    )));
                }
                if index
                    .insert(spec.key.clone(), (namespace, position))
                    .is_some()
                {
                    return Err(ProtocolError::InvalidCatalog(format!(
                        "duplicate key: {}",
                        spec.key
                    )));
                }
            }
        }

        let mut spans: Vec<&RegisterSpec> = read.iter().collect();
        spans.sort_by_key(|spec| spec.address);
        for pair in spans.windows(2) {
            if pair[1].address <= pair[0].end_address() {
                return Err(ProtocolError::InvalidCatalog(format!(
                    "{} at {} overlaps {} at {}",
                    pair[1].key, pair[1].address, pair[0].key, pair[0].address
                )));
            }
        }

        Ok(Self {
            read,
            write,
            index,
            no_merge: no_merge.into_iter().collect(),
        })
    }

    /// Dachs GLT 默认寄存器表。
    pub fn dachs() -> Result<Self, ProtocolError> {
        let read = build_specs(DACHS_READ, Access::ReadOnly)?;
        let write = build_specs(DACHS_WRITE, Access::ReadWrite)?;
        Self::new(read, write, DACHS_NO_MERGE.iter().copied())?
            .with_aliases(DACHS_LEGACY_KEYS.iter().copied())
    }

    /// 注册 key 别名。别名不能与已有 key 重名，目标必须存在。
    pub fn with_aliases<'k>(
        mut self,
        aliases: impl IntoIterator<Item = (&'k str, &'k str)>,
    ) -> Result<Self, ProtocolError> {
        for (alias, target) in aliases {
            let entry = *self.index.get(target).ok_or_else(|| {
                ProtocolError::InvalidCatalog(format!(
                    "alias {} targets unknown key {}",
                    alias, target
                ))
            })?;
            if self.index.insert(alias.to_string(), entry).is_some() {
                return Err(ProtocolError::InvalidCatalog(format!(
                    "duplicate key: {}",
                    alias
                )));
            }
        }
        Ok(self)
    }

    /// 在两个命名空间中查找。
    pub fn lookup(&self, key: &str) -> Result<&RegisterSpec, ProtocolError> {
        match self.index.get(key) {
            Some((Namespace::Read, position)) => Ok(&self.read[*position]),
            Some((Namespace::Write, position)) => Ok(&self.write[*position]),
            None => Err(ProtocolError::UnknownKey(key.to_string())),
        }
    }

    /// 仅在读表中查找。
    pub fn lookup_read(&self, key: &str) -> Result<&RegisterSpec, ProtocolError> {
        match self.index.get(key) {
            Some((Namespace::Read, position)) => Ok(&self.read[*position]),
            _ => Err(ProtocolError::UnknownKey(key.to_string())),
        }
    }

    /// 仅在写表中查找。
    pub fn lookup_write(&self, key: &str) -> Result<&RegisterSpec, ProtocolError> {
        match self.index.get(key) {
            Some((Namespace::Write, position)) => Ok(&self.write[*position]),
            _ => Err(ProtocolError::UnknownKey(key.to_string())),
        }
    }

    pub fn read_specs(&self) -> &[RegisterSpec] {
        &self.read
    }

    pub fn write_specs(&self) -> &[RegisterSpec] {
        &self.write
    }

    /// 不可合并读取的地址集合。
    pub fn no_merge(&self) -> &BTreeSet<u16> {
        &self.no_merge
    }

    /// 过滤出读表中存在的 key（别名换成正式 key），保持顺序并去重。
    pub fn sanitize_read_keys<I, S>(&self, keys: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        keys.into_iter()
            .filter_map(|key| self.lookup_read(key.as_ref().trim()).ok())
            .filter(|spec| seen.insert(spec.key.as_str()))
            .map(|spec| spec.key.clone())
            .collect()
    }
}

fn build_specs(rows: &[Row], access: Access) -> Result<Vec<RegisterSpec>, ProtocolError> {
    rows.iter()
        .map(|(key, address, word_count, raw_type, format)| -> Result<RegisterSpec, ProtocolError> {
            Ok(RegisterSpec {
                key: (*key).to_string(),
                address: *address,
                word_count: *word_count,
                raw_type: *raw_type,
                format: format.parse::<RegisterFormat>()?,
                access,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(key: &str, address: u16, word_count: u16) -> RegisterSpec {
        RegisterSpec {
            key: key.to_string(),
            address,
            word_count,
            raw_type: RawType::U16,
            format: RegisterFormat::Raw,
            access: Access::ReadOnly,
        }
    }

    #[test]
    fn dachs_catalog_is_valid() {
        let catalog = RegisterCatalog::dachs().expect("catalog");
        assert_eq!(catalog.read_specs().len(), 75);
        assert_eq!(catalog.lookup_write(HEARTBEAT_PIN_KEY).unwrap().address, 8300);
        assert_eq!(
            catalog.lookup_write(ELECTRICAL_SETPOINT_KEY).unwrap().format,
            RegisterFormat::Fix(0)
        );
        assert_eq!(catalog.lookup(LOCKED_KEY).unwrap().address, 8302);
        assert!(catalog.no_merge().contains(&8016));
        for key in FAST_KEYS {
            assert!(catalog.lookup_read(key).is_ok(), "fast key {}", key);
        }
    }

    #[test]
    fn namespaces_are_separate() {
        let catalog = RegisterCatalog::dachs().expect("catalog");
        assert!(matches!(
            catalog.lookup_read(HEARTBEAT_PIN_KEY),
            Err(ProtocolError::UnknownKey(_))
        ));
        assert!(matches!(
            catalog.lookup_write("temp_in_c"),
            Err(ProtocolError::UnknownKey(_))
        ));
        assert!(matches!(
            catalog.lookup("nope"),
            Err(ProtocolError::UnknownKey(_))
        ));
    }

    #[test]
    fn rejects_shared_start_address() {
        let result = RegisterCatalog::new(vec![spec("a", 10, 1), spec("b", 10, 1)], vec![], []);
        assert!(matches!(result, Err(ProtocolError::InvalidCatalog(_))));
    }

    #[test]
    fn rejects_overlapping_spans() {
        let result = RegisterCatalog::new(vec![spec("a", 10, 2), spec("b", 11, 1)], vec![], []);
        assert!(matches!(result, Err(ProtocolError::InvalidCatalog(_))));
    }

    #[test]
    fn rejects_duplicate_keys_across_namespaces() {
        let mut write = spec("a", 20, 1);
        write.access = Access::ReadWrite;
        let result = RegisterCatalog::new(vec![spec("a", 10, 1)], vec![write], []);
        assert!(matches!(result, Err(ProtocolError::InvalidCatalog(_))));
    }

    #[test]
    fn rejects_multi_word_writes() {
        let result = RegisterCatalog::new(vec![], vec![spec("w", 20, 2)], []);
        assert!(matches!(result, Err(ProtocolError::InvalidCatalog(_))));
    }

    #[test]
    fn sanitize_keeps_known_read_keys() {
        let catalog = RegisterCatalog::dachs().expect("catalog");
        let keys = catalog.sanitize_read_keys([
            "temp_in_c",
            "bogus",
            " temp_in_c",
            "glt_pin",
            "plant_status",
        ]);
        assert_eq!(keys, vec!["temp_in_c".to_string(), "plant_status".to_string()]);
    }

    #[test]
    fn legacy_key_names_resolve_to_current_keys() {
        let catalog = RegisterCatalog::dachs().expect("catalog");
        assert_eq!(catalog.lookup_read("plant_status_enum").unwrap().key, "plant_status");
        assert_eq!(catalog.lookup_read("temp_out_C").unwrap().address, 8019);
        assert_eq!(catalog.lookup_write("bhkw_locked_bool").unwrap().key, LOCKED_KEY);
        assert!(catalog.lookup_read("electrical_setpoint_W").is_err());

        let keys = catalog.sanitize_read_keys(["we2_available_bool", "temp_in_C", "temp_in_c"]);
        assert_eq!(keys, vec!["we2_available".to_string(), "temp_in_c".to_string()]);
    }

    #[test]
    fn rejects_bad_aliases() {
        let catalog = || RegisterCatalog::new(vec![spec("a", 10, 1), spec("b", 11, 1)], vec![], []);
        let result = catalog().unwrap().with_aliases([("x", "missing")]);
        assert!(matches!(result, Err(ProtocolError::InvalidCatalog(_))));
        let result = catalog().unwrap().with_aliases([("b", "a")]);
        assert!(matches!(result, Err(ProtocolError::InvalidCatalog(_))));
        let aliased = catalog().unwrap().with_aliases([("a_old", "a")]).unwrap();
        assert_eq!(aliased.lookup("a_old").unwrap().address, 10);
    }

    #[test]
    fn enum_labels() {
        assert_eq!(enum_label("plant_status", 2), Some("running"));
        assert_eq!(enum_label("last_shutdown_reason", 11), Some("building management release"));
        assert_eq!(enum_label("plant_status", 99), None);
        assert_eq!(enum_label("temp_in_c", 1), None);
    }
}
