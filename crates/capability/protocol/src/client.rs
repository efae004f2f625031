//! Dachs 寄存器客户端门面
//!
//! 所有操作在整个执行期间持有同一把异步锁，线上请求不会交错；
//! 重试的退避等待也在锁内完成。

use crate::catalog::{ELECTRICAL_SETPOINT_KEY, HEARTBEAT_PIN_KEY, LOCKED_KEY, RegisterCatalog};
use crate::codec;
use crate::error::ProtocolError;
use crate::heartbeat::{HeartbeatOutcome, HeartbeatState};
use crate::modbus_tcp::{ClientConfig, ModbusTcpConnector};
use crate::planner::{BlockPlanner, ReadBlock};
use crate::retry::RetryPolicy;
use crate::session::{SessionManager, SessionState};
use crate::transport::Connector;
use crate::types::RegisterSpec;
use domain::{Readings, RegisterValue};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

/// CHP 寄存器客户端。克隆后共享同一连接与心跳状态。
#[derive(Clone)]
pub struct ChpClient {
    catalog: Arc<RegisterCatalog>,
    planner: Arc<BlockPlanner>,
    per_key_reads: bool,
    inner: Arc<Mutex<ClientInner>>,
}

struct ClientInner {
    session: SessionManager,
    heartbeat: HeartbeatState,
    read_policy: RetryPolicy,
    write_policy: RetryPolicy,
    request_gap: Duration,
}

impl ChpClient {
    pub fn new(
        config: ClientConfig,
        catalog: RegisterCatalog,
        connector: impl Connector + 'static,
    ) -> Self {
        let heartbeat_address = catalog
            .lookup_write(HEARTBEAT_PIN_KEY)
            .ok()
            .map(|spec| spec.address);
        let planner = BlockPlanner::new(config.max_block_width, catalog.no_merge().clone());
        let session = SessionManager::new(
            Arc::new(connector),
            heartbeat_address,
            config.connect_timeout(),
            config.request_timeout(),
        );
        let inner = ClientInner {
            session,
            heartbeat: HeartbeatState::new(
                config.heartbeat_throttle,
                config.heartbeat_min_interval(),
            ),
            read_policy: RetryPolicy::for_reads(config.retry_base_delay()),
            write_policy: RetryPolicy::for_writes(config.retry_base_delay()),
            request_gap: config.request_gap(),
        };
        Self {
            catalog: Arc::new(catalog),
            planner: Arc::new(planner),
            per_key_reads: config.per_key_reads,
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    /// 使用 tokio-modbus TCP 连接器创建客户端。
    pub fn modbus_tcp(config: ClientConfig, catalog: RegisterCatalog) -> Self {
        let connector = ModbusTcpConnector::new(&config);
        Self::new(config, catalog, connector)
    }

    pub fn catalog(&self) -> &RegisterCatalog {
        &self.catalog
    }

    #[doc(hidden)]
    pub async fn session_state(&self) -> SessionState {
        self.inner.lock().await.session.state()
    }

    /// 当前记住的心跳 PIN。
    pub async fn heartbeat_pin(&self) -> Option<u16> {
        self.inner.lock().await.heartbeat.pin()
    }

    /// 读取一组 key。
    ///
    /// 空输入直接返回空表；未知 key 在任何线上操作之前报错。
    /// 设备拒绝的区间和短响应截断的 key 返回 `None`。
    pub async fn read_keys<S>(&self, keys: &[S]) -> Result<Readings, ProtocolError>
    where
        S: AsRef<str> + Sync,
    {
        if keys.is_empty() {
            return Ok(Readings::new());
        }

        let mut seen = HashSet::new();
        let mut specs: Vec<&RegisterSpec> = Vec::with_capacity(keys.len());
        for key in keys {
            let spec = self.catalog.lookup_read(key.as_ref().trim())?;
            if seen.insert(spec.key.as_str()) {
                specs.push(spec);
            }
        }
        let blocks = if self.per_key_reads {
            self.planner.plan_per_key(&specs)
        } else {
            self.planner.plan(&specs)
        };

        let started = Instant::now();
        let mut inner = self.inner.lock().await;
        let result = inner.read_with_retry(&specs, &blocks).await;
        drop(inner);

        chp_telemetry::record_read_latency_ms(started.elapsed().as_millis() as u64);
        match &result {
            Ok(readings) => {
                chp_telemetry::record_read_success();
                debug!(
                    target: "chp.protocol",
                    keys = readings.len(),
                    blocks = blocks.len(),
                    missing = readings.values().filter(|value| value.is_none()).count(),
                    "read keys"
                );
            }
            Err(err) => {
                chp_telemetry::record_read_failure();
                warn!(target: "chp.protocol", error = %err, "read keys failed");
            }
        }
        result
    }

    /// 读取读表中的全部 key。
    pub async fn read_all(&self) -> Result<Readings, ProtocolError> {
        let keys: Vec<&str> = self
            .catalog
            .read_specs()
            .iter()
            .map(|spec| spec.key.as_str())
            .collect();
        self.read_keys(&keys).await
    }

    /// 编码并写入单个可写寄存器；瞬时错误时重连后重试一次。
    pub async fn write_key(&self, key: &str, value: RegisterValue) -> Result<(), ProtocolError> {
        let spec = self.catalog.lookup_write(key)?;
        let raw = codec::encode(spec, value)?;
        let word = u16::try_from(raw).map_err(|_| ProtocolError::OutOfRange {
            key: spec.key.clone(),
            value: value.to_string(),
        })?;
        self.write_word(spec, word).await
    }

    /// 写入电功率设定值，返回实际下发的瓦数（限幅并按 10 W 取整）。
    pub async fn write_electrical_setpoint(&self, watts: f64) -> Result<f64, ProtocolError> {
        let spec = self.catalog.lookup_write(ELECTRICAL_SETPOINT_KEY)?;
        let (raw, sent_watts) = codec::quantize_setpoint(watts)?;
        self.write_word(spec, raw).await?;
        info!(target: "chp.control", requested_w = watts, sent_w = sent_watts, "electrical setpoint written");
        Ok(sent_watts)
    }

    /// 写入锁定标志。
    pub async fn set_locked(&self, locked: bool) -> Result<(), ProtocolError> {
        self.write_key(LOCKED_KEY, RegisterValue::from(locked)).await
    }

    /// 发送心跳。
    ///
    /// 传入 PIN 时记住并立即写入；不传时重发记住的 PIN。
    pub async fn heartbeat(&self, pin: Option<u16>) -> Result<HeartbeatOutcome, ProtocolError> {
        let address = self.catalog.lookup_write(HEARTBEAT_PIN_KEY)?.address;
        let mut inner = self.inner.lock().await;
        inner.heartbeat(address, pin).await
    }

    /// 关闭连接；可重复调用。
    pub async fn close(&self) {
        self.inner.lock().await.session.close().await;
    }

    async fn write_word(&self, spec: &RegisterSpec, word: u16) -> Result<(), ProtocolError> {
        let mut inner = self.inner.lock().await;
        let result = inner.write_with_retry(spec.address, word).await;
        drop(inner);

        match &result {
            Ok(()) => {
                chp_telemetry::record_write_success();
                debug!(target: "chp.control", key = %spec.key, address = spec.address, value = word, "register written");
            }
            Err(err) => {
                chp_telemetry::record_write_failure();
                warn!(target: "chp.control", key = %spec.key, address = spec.address, error = %err, "register write failed");
            }
        }
        result
    }
}

impl ClientInner {
    async fn read_with_retry(
        &mut self,
        specs: &[&RegisterSpec],
        blocks: &[ReadBlock<'_>],
    ) -> Result<Readings, ProtocolError> {
        let mut retry = 0;
        loop {
            match self.read_blocks(specs, blocks).await {
                Ok(readings) => return Ok(readings),
                Err(err) => {
                    retry += 1;
                    backoff(self.read_policy, retry, err, "read").await?;
                }
            }
        }
    }

    /// 逐块读取后按地址拼接，再逐 key 解码。
    async fn read_blocks(
        &mut self,
        specs: &[&RegisterSpec],
        blocks: &[ReadBlock<'_>],
    ) -> Result<Readings, ProtocolError> {
        let mut words: BTreeMap<u16, u16> = BTreeMap::new();
        for (index, block) in blocks.iter().enumerate() {
            if index > 0 && !self.request_gap.is_zero() {
                sleep(self.request_gap).await;
            }
            let received = match self
                .session
                .read_input_registers(&mut self.heartbeat, block.range.start, block.range.len())
                .await
            {
                Ok(received) => received,
                // 只吞掉本区间的异常；补发心跳等其他请求的异常上抛
                Err(ProtocolError::DeviceException { address, .. })
                    if address == block.range.start =>
                {
                    continue;
                }
                Err(err) => return Err(err),
            };
            if received.len() < usize::from(block.range.len()) {
                debug!(
                    target: "chp.protocol",
                    range = %block.range,
                    received = received.len(),
                    "short response"
                );
            }
            for (address, word) in (block.range.start..=block.range.end).zip(received) {
                words.insert(address, word);
            }
        }

        let mut readings = Readings::new();
        for spec in specs {
            readings.insert(spec.key.clone(), decode_from(spec, &words));
        }
        Ok(readings)
    }

    async fn write_with_retry(&mut self, address: u16, value: u16) -> Result<(), ProtocolError> {
        let mut retry = 0;
        loop {
            match self
                .session
                .write_single_register(&mut self.heartbeat, address, value)
                .await
            {
                Ok(()) => return Ok(()),
                Err(err) => {
                    retry += 1;
                    backoff(self.write_policy, retry, err, "write").await?;
                }
            }
        }
    }

    async fn heartbeat(
        &mut self,
        address: u16,
        pin: Option<u16>,
    ) -> Result<HeartbeatOutcome, ProtocolError> {
        let pin = pin
            .or(self.heartbeat.pin())
            .ok_or(ProtocolError::NoHeartbeatConfigured)?;
        if self.heartbeat.should_throttle(pin, Instant::now()) {
            chp_telemetry::record_heartbeat_throttled();
            debug!(target: "chp.control", "heartbeat throttled");
            return Ok(HeartbeatOutcome::Throttled);
        }
        self.heartbeat.remember(pin);

        let mut retry = 0;
        loop {
            // 新建连接时的补发已经写入了当前 PIN
            let result = match self.session.ensure_connected(&mut self.heartbeat).await {
                Ok(true) => Ok(()),
                Ok(false) => {
                    self.session
                        .write_single_register(&mut self.heartbeat, address, pin)
                        .await
                }
                Err(err) => Err(err),
            };
            match result {
                Ok(()) => {
                    self.heartbeat.mark_sent(pin, Instant::now());
                    chp_telemetry::record_heartbeat_sent();
                    debug!(target: "chp.control", address, "heartbeat sent");
                    return Ok(HeartbeatOutcome::Sent);
                }
                Err(err) => {
                    retry += 1;
                    backoff(self.write_policy, retry, err, "heartbeat").await?;
                }
            }
        }
    }
}

/// 瞬时错误按策略等待后返回 Ok 以继续重试；不可重试或次数耗尽时返回原错误。
async fn backoff(
    policy: RetryPolicy,
    retry: u32,
    err: ProtocolError,
    operation: &'static str,
) -> Result<(), ProtocolError> {
    if !err.is_transient() {
        return Err(err);
    }
    let Some(delay) = policy.delay_for(retry) else {
        return Err(err);
    };
    chp_telemetry::record_retry();
    warn!(
        target: "chp.protocol",
        operation,
        retry,
        delay_ms = delay.as_millis() as u64,
        error = %err,
        "transient failure, retrying"
    );
    sleep(delay).await;
    Ok(())
}

/// 从拼接后的寄存器中取出一个 key 的字并解码；缺字或解码失败返回 None。
fn decode_from(spec: &RegisterSpec, words: &BTreeMap<u16, u16>) -> Option<RegisterValue> {
    let slice: Option<Vec<u16>> = (spec.address..=spec.end_address())
        .map(|address| words.get(&address).copied())
        .collect();
    let slice = slice?;
    match codec::decode(spec, &slice) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(target: "chp.protocol", key = %spec.key, error = %err, "failed to decode register");
            None
        }
    }
}
