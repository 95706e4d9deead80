//! Pattern resolution between logical and physical names.
//!
//! The platform multiplexes tenants onto shared clusters by expanding
//! logical names through discovery-provided patterns, e.g.
//! `{tenant}-{instance}-{environment}-{topic}`. Applications only ever see
//! logical names: arguments are resolved on the way to the transport and
//! results are unresolved on the way back.
//!
//! All functions here are pure; they read the discovery result and never
//! touch client state.

use streamline_types::{TopicPartition, TopicPartitionOffset};

use crate::discovery::{DiscoveryResult, fields};
use crate::error::{ResolutionSnafu, Result};

/// Resolves `{placeholder}` tokens in `pattern`.
///
/// Placeholders are looked up first in `extra` bindings, then in the
/// discovery result's fields.
///
/// # Errors
///
/// Returns [`ClientError::Resolution`](crate::ClientError::Resolution) if a
/// placeholder has no binding, or if the pattern has an unterminated `{`.
pub fn resolve_pattern(
    pattern: &str,
    result: &DiscoveryResult,
    extra: &[(&str, &str)],
) -> Result<String> {
    let mut resolved = String::with_capacity(pattern.len());
    let mut rest = pattern;

    while let Some(open) = rest.find('{') {
        resolved.push_str(&rest[..open]);
        rest = &rest[open + 1..];
        let Some(close) = rest.find('}') else {
            return ResolutionSnafu { pattern, missing: "<unterminated placeholder>" }.fail();
        };
        let name = &rest[..close];
        let value = extra
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| *value)
            .or_else(|| result.field(name));
        match value {
            Some(value) => resolved.push_str(value),
            None => return ResolutionSnafu { pattern, missing: name }.fail(),
        }
        rest = &rest[close + 1..];
    }
    resolved.push_str(rest);
    Ok(resolved)
}

/// Resolves the consumer group id for an application.
///
/// Applies the discovery result's group-id pattern with `{group}` bound to
/// the application id. This step is consumer-only; producers never call it.
///
/// # Errors
///
/// Returns a resolution error if the pattern field is absent or references
/// missing fields.
pub fn resolve_group(result: &DiscoveryResult, application_id: &str) -> Result<String> {
    let Some(pattern) = result.field(fields::GROUP_ID_PATTERN) else {
        return ResolutionSnafu {
            pattern: fields::GROUP_ID_PATTERN,
            missing: fields::GROUP_ID_PATTERN,
        }
        .fail();
    };
    resolve_pattern(pattern, result, &[("group", application_id)])
}

/// Resolves a logical topic name to its physical form.
///
/// A discovery result without a topic pattern maps names identically; that
/// is the single-cluster case.
///
/// # Errors
///
/// Returns a resolution error if the pattern references missing fields.
pub fn resolve_topic(result: &DiscoveryResult, topic: &str) -> Result<String> {
    match result.field(fields::TOPIC_PATTERN) {
        Some(pattern) => resolve_pattern(pattern, result, &[("topic", topic)]),
        None => Ok(topic.to_owned()),
    }
}

/// Resolves a list of logical topic names.
///
/// # Errors
///
/// Fails on the first name the pattern cannot resolve.
pub fn resolve_topics(result: &DiscoveryResult, topics: &[String]) -> Result<Vec<String>> {
    topics.iter().map(|topic| resolve_topic(result, topic)).collect()
}

/// Maps a physical topic name back to its logical form.
///
/// Names that do not match the pattern's expansion (or results without a
/// pattern) pass through unchanged.
#[must_use]
pub fn unresolve_topic(result: &DiscoveryResult, physical: &str) -> String {
    let Some(pattern) = result.field(fields::TOPIC_PATTERN) else {
        return physical.to_owned();
    };
    let Some((prefix_pattern, suffix_pattern)) = pattern.split_once("{topic}") else {
        return physical.to_owned();
    };
    let (Ok(prefix), Ok(suffix)) = (
        resolve_pattern(prefix_pattern, result, &[]),
        resolve_pattern(suffix_pattern, result, &[]),
    ) else {
        return physical.to_owned();
    };
    match physical.strip_prefix(&prefix).and_then(|rest| rest.strip_suffix(&suffix)) {
        Some(logical) if !logical.is_empty() => logical.to_owned(),
        _ => physical.to_owned(),
    }
}

/// Resolves the topic in a partition reference.
///
/// # Errors
///
/// Returns a resolution error if the topic cannot be resolved.
pub fn resolve_partition(
    result: &DiscoveryResult,
    partition: &TopicPartition,
) -> Result<TopicPartition> {
    Ok(TopicPartition {
        topic: resolve_topic(result, &partition.topic)?,
        partition: partition.partition,
    })
}

/// Resolves the topics in a list of partition references.
///
/// # Errors
///
/// Fails on the first topic the pattern cannot resolve.
pub fn resolve_partitions(
    result: &DiscoveryResult,
    partitions: &[TopicPartition],
) -> Result<Vec<TopicPartition>> {
    partitions.iter().map(|p| resolve_partition(result, p)).collect()
}

/// Unresolves the topics in a list of partition references.
#[must_use]
pub fn unresolve_partitions(
    result: &DiscoveryResult,
    partitions: Vec<TopicPartition>,
) -> Vec<TopicPartition> {
    partitions
        .into_iter()
        .map(|p| TopicPartition { topic: unresolve_topic(result, &p.topic), partition: p.partition })
        .collect()
}

/// Resolves the topics in a list of offset references.
///
/// # Errors
///
/// Fails on the first topic the pattern cannot resolve.
pub fn resolve_offsets(
    result: &DiscoveryResult,
    offsets: &[TopicPartitionOffset],
) -> Result<Vec<TopicPartitionOffset>> {
    offsets
        .iter()
        .map(|o| {
            Ok(TopicPartitionOffset {
                topic: resolve_topic(result, &o.topic)?,
                partition: o.partition,
                offset: o.offset,
            })
        })
        .collect()
}

/// Unresolves the topics in a list of offset references.
#[must_use]
pub fn unresolve_offsets(
    result: &DiscoveryResult,
    offsets: Vec<TopicPartitionOffset>,
) -> Vec<TopicPartitionOffset> {
    offsets
        .into_iter()
        .map(|o| TopicPartitionOffset {
            topic: unresolve_topic(result, &o.topic),
            partition: o.partition,
            offset: o.offset,
        })
        .collect()
}
