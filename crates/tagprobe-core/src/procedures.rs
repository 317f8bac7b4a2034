//! Built-in test procedures.
//!
//! Each procedure catches its own errors: they are logged in the
//! diagnostic format and the procedure reports failure.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use tracing::debug;

use tagprobe_types::{IrTemperature, uuids};

use crate::adapter::{CharacteristicInfo, ServiceInfo};
use crate::error::{Error, Result};
use crate::testing::{TestContext, TestFuture};

/// Measurement period assumed when the period characteristic is unreadable.
pub const DEFAULT_MEASUREMENT_PERIOD: Duration = Duration::from_secs(1);

/// Walk every service and characteristic, reading each readable value and
/// writing it back where the characteristic accepts writes with response.
pub fn read_all_characteristics(context: TestContext) -> TestFuture {
    Box::pin(async move {
        let outcome = read_all(&context).await;
        context.report(outcome)
    })
}

async fn read_all(context: &TestContext) -> Result<()> {
    let services = context.adapter.services(&context.device).await?;
    for service in &services {
        context.log(format!("Found service: {}", service.uuid));
        for characteristic in &service.characteristics {
            if characteristic.uuid == uuids::GAP_APPEARANCE {
                continue;
            }

            context.log(format!("Found characteristic: {}", characteristic.uuid));
            if !characteristic.properties.readable {
                continue;
            }

            context.log("Reading value...");
            let value = context
                .adapter
                .read_characteristic(&context.device, characteristic)
                .await?;
            context.log(format!("Got base64 value: {}", BASE64_STANDARD.encode(&value)));

            if characteristic.properties.writable_with_response {
                context
                    .adapter
                    .write_characteristic_with_response(&context.device, characteristic, &value)
                    .await?;
                context.log("Successfully written value back");
            }
        }
    }
    Ok(())
}

/// Enable the IR temperature sensor, wait one measurement period and log
/// the object and ambient temperatures.
pub fn read_temperature(context: TestContext) -> TestFuture {
    Box::pin(async move {
        context.log("Read temperature");
        let outcome = read_ir_temperature(&context).await;
        context.report(outcome)
    })
}

async fn read_ir_temperature(context: &TestContext) -> Result<()> {
    let services = context.adapter.services(&context.device).await?;
    let service = services
        .iter()
        .find(|s| s.uuid == uuids::IR_TEMPERATURE_SERVICE)
        .ok_or_else(|| Error::ServiceNotFound(uuids::IR_TEMPERATURE_SERVICE.to_string()))?;

    let config = find_characteristic(service, services.len(), uuids::IR_TEMPERATURE_CONFIG)?;
    let data = find_characteristic(service, services.len(), uuids::IR_TEMPERATURE_DATA)?;

    context
        .adapter
        .write_characteristic_with_response(&context.device, config, &[uuids::SENSOR_ENABLE])
        .await?;

    let period = measurement_period(context, service).await;
    debug!("Waiting {:?} for the first measurement", period);
    tokio::time::sleep(period).await;

    let raw = context
        .adapter
        .read_characteristic(&context.device, data)
        .await?;
    let reading = IrTemperature::from_bytes(&raw)?;
    context.log(format!("Object temperature: {:.2} °C", reading.object));
    context.log(format!("Ambient temperature: {:.2} °C", reading.ambient));
    Ok(())
}

fn find_characteristic(
    service: &ServiceInfo,
    service_count: usize,
    uuid: uuid::Uuid,
) -> Result<&CharacteristicInfo> {
    service
        .characteristic(uuid)
        .ok_or_else(|| Error::characteristic_not_found(uuid.to_string(), service_count))
}

/// The sensor period characteristic holds the period in units of 10 ms.
async fn measurement_period(context: &TestContext, service: &ServiceInfo) -> Duration {
    let Some(period) = service.characteristic(uuids::IR_TEMPERATURE_PERIOD) else {
        return DEFAULT_MEASUREMENT_PERIOD;
    };
    if !period.properties.readable {
        return DEFAULT_MEASUREMENT_PERIOD;
    }
    match context.adapter.read_characteristic(&context.device, period).await {
        Ok(value) => match value.first() {
            Some(&units) if units > 0 => Duration::from_millis(u64::from(units) * 10),
            _ => DEFAULT_MEASUREMENT_PERIOD,
        },
        Err(e) => {
            debug!("Period read failed, using default: {}", e);
            DEFAULT_MEASUREMENT_PERIOD
        }
    }
}
