//! Renet channel layout.
//!
//! Channel 0: ReliableOrdered - update records, rejections, join replies
//! Channel 1: ReliableOrdered - intents and joins from clients
//! Channel 2: Unreliable - ping/pong

use std::time::Duration;

use renet::ChannelConfig;

pub mod channel_id {
    /// Replication records must arrive in the order they were produced.
    pub const UPDATES: u8 = 0;
    pub const INTENTS: u8 = 1;
    pub const HEARTBEAT: u8 = 2;
}

const MAX_CHANNEL_MEMORY: usize = 5 * 1024 * 1024; // 5 MB

pub fn create_channel_configs() -> Vec<ChannelConfig> {
    vec![
        ChannelConfig {
            channel_id: channel_id::UPDATES,
            max_memory_usage_bytes: MAX_CHANNEL_MEMORY,
            send_type: renet::SendType::ReliableOrdered {
                resend_time: Duration::from_millis(300),
            },
        },
        ChannelConfig {
            channel_id: channel_id::INTENTS,
            max_memory_usage_bytes: MAX_CHANNEL_MEMORY / 4,
            send_type: renet::SendType::ReliableOrdered {
                resend_time: Duration::from_millis(300),
            },
        },
        ChannelConfig {
            channel_id: channel_id::HEARTBEAT,
            max_memory_usage_bytes: 64 * 1024,
            send_type: renet::SendType::Unreliable,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_and_intent_channels_are_ordered() {
        let configs = create_channel_configs();
        assert_eq!(configs.len(), 3);
        for id in [channel_id::UPDATES, channel_id::INTENTS] {
            let config = configs.iter().find(|c| c.channel_id == id).unwrap();
            assert!(matches!(
                config.send_type,
                renet::SendType::ReliableOrdered { .. }
            ));
        }
        assert_eq!(configs[2].channel_id, channel_id::HEARTBEAT);
    }
}
