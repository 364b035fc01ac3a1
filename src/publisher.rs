//! Velocity command publishing.
//!
//! Speaks the rosbridge wire protocol: one JSON op per line over TCP. The
//! publisher advertises its topic once at connect, sends one `publish` op per
//! command (fire-and-forget, no acknowledgment), and unadvertises best-effort
//! on drop.

use serde::Serialize;
use std::io::{BufWriter, Write};
use std::net::TcpStream;
use thiserror::Error;
use tracing::{debug, info};

use crate::twist::Twist;

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Failed to connect to rosbridge at {0}: {1}")]
    Connect(String, String),

    #[error("Publish failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Fire-and-forget sink for velocity commands
pub trait CommandPublisher {
    fn publish(&mut self, msg: &Twist) -> Result<(), PublishError>;
}

/// rosbridge protocol ops used by the publisher
#[derive(Serialize)]
#[serde(tag = "op", rename_all = "lowercase")]
enum RosbridgeOp<'a> {
    Advertise {
        id: &'a str,
        topic: &'a str,
        #[serde(rename = "type")]
        msg_type: &'a str,
    },
    Publish {
        topic: &'a str,
        msg: &'a Twist,
    },
    Unadvertise {
        id: &'a str,
        topic: &'a str,
    },
}

/// Publishes velocity commands onto a ROS graph through a rosbridge endpoint
pub struct RosbridgePublisher {
    writer: BufWriter<TcpStream>,
    topic: String,
    advertise_id: String,
}

impl RosbridgePublisher {
    /// Connect to the endpoint and advertise the topic.
    ///
    /// The node name becomes the advertise id prefix, which is how this
    /// publisher is identified on the ROS graph.
    pub fn connect(addr: &str, topic: &str, node_name: &str) -> Result<Self, PublishError> {
        let stream = TcpStream::connect(addr)
            .map_err(|e| PublishError::Connect(addr.to_string(), e.to_string()))?;
        stream.set_nodelay(true).ok();

        let advertise_id = format!("{}:{}", node_name, topic);
        let advertise = serde_json::to_string(&RosbridgeOp::Advertise {
            id: &advertise_id,
            topic,
            msg_type: Twist::ROS_TYPE,
        })?;

        let mut publisher = Self {
            writer: BufWriter::new(stream),
            topic: topic.to_string(),
            advertise_id,
        };
        publisher.send_line(&advertise)?;

        info!("Advertised '{}' on rosbridge at {}", topic, addr);
        Ok(publisher)
    }

    fn send_line(&mut self, line: &str) -> Result<(), PublishError> {
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

impl CommandPublisher for RosbridgePublisher {
    fn publish(&mut self, msg: &Twist) -> Result<(), PublishError> {
        let line = serde_json::to_string(&RosbridgeOp::Publish {
            topic: &self.topic,
            msg,
        })?;
        self.send_line(&line)?;

        debug!(
            "Published linear.x={} angular.z={}",
            msg.linear.x, msg.angular.z
        );
        Ok(())
    }
}

impl Drop for RosbridgePublisher {
    fn drop(&mut self) {
        if let Ok(line) = serde_json::to_string(&RosbridgeOp::Unadvertise {
            id: &self.advertise_id,
            topic: &self.topic,
        }) {
            let _ = self.send_line(&line);
        }
    }
}
