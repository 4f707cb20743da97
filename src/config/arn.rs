//! SQS queue ARN parsing.

use std::fmt;
use std::str::FromStr;

use crate::error::{ConfigError, InvalidArnSnafu};

/// The pieces of `arn:aws:sqs:<region>:<account>:<name>` the queue client needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueArn {
    pub region: String,
    pub account: String,
    pub name: String,
}

impl FromStr for QueueArn {
    type Err = ConfigError;

    fn from_str(arn: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidArnSnafu { arn }.build();

        let parts: Vec<&str> = arn.splitn(6, ':').collect();
        let [prefix, _partition, service, region, account, name] = parts[..] else {
            return Err(invalid());
        };

        if prefix != "arn" || service != "sqs" {
            return Err(invalid());
        }
        if region.is_empty() || account.is_empty() || name.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            region: region.to_string(),
            account: account.to_string(),
            name: name.to_string(),
        })
    }
}

impl fmt::Display for QueueArn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "arn:aws:sqs:{}:{}:{}", self.region, self.account, self.name)
    }
}
