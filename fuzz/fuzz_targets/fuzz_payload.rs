#![no_main]
use dispenser_core::command::{ChannelKeys, PayloadSchema, parse_wash_request};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let schema = PayloadSchema::new(
        "commandId",
        vec![
            ChannelKeys::new("zinc"),
            ChannelKeys::new("melatonin"),
            ChannelKeys::new("magnesium").alias("magnesum"),
            ChannelKeys::new("electrolyte"),
        ],
    );
    if let Ok(cmd) = schema.normalize(data) {
        // Normalized amounts are always usable durations.
        assert!(cmd.amounts.iter().all(|(_, u)| u.is_finite() && u >= 0.0));
    }
    let _ = parse_wash_request(data);
});
