// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use super::*;

#[test]
fn key_renders_stage_then_tenant() {
    assert_eq!(CacheKey::platform("wx123").to_string(), "component_access_token_wx123");
    assert_eq!(CacheKey::authorizer("wx123").to_string(), "authorizer_access_token_wx123");
}

#[test]
fn keys_with_delimiters_stay_distinct() {
    let a = CacheKey::platform("a_b");
    let b = CacheKey::new("b", Stage::PlatformAccessToken);
    assert_ne!(a, b);
    assert_ne!(CacheKey::platform("x"), CacheKey::authorizer("x"));
}

#[tokio::test(start_paused = true)]
async fn entry_lives_until_ttl() -> anyhow::Result<()> {
    let cache = MemoryCache::new();
    let key = CacheKey::platform("wx123");
    cache.put(&key, "ACCESS1".into(), Duration::from_secs(5700)).await?;

    assert_eq!(cache.get(&key).await?.as_deref(), Some("ACCESS1"));
    assert_eq!(cache.ttl(&key).await, Some(Duration::from_secs(5700)));

    tokio::time::advance(Duration::from_secs(5699)).await;
    assert_eq!(cache.get(&key).await?.as_deref(), Some("ACCESS1"));

    tokio::time::advance(Duration::from_secs(1)).await;
    assert_eq!(cache.get(&key).await?, None);
    assert_eq!(cache.ttl(&key).await, None);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn last_write_wins() -> anyhow::Result<()> {
    let cache = MemoryCache::new();
    let key = CacheKey::authorizer("wx123");
    cache.put(&key, "first".into(), Duration::from_secs(10)).await?;
    cache.put(&key, "second".into(), Duration::from_secs(20)).await?;
    assert_eq!(cache.get(&key).await?.as_deref(), Some("second"));
    assert_eq!(cache.ttl(&key).await, Some(Duration::from_secs(20)));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn purge_drops_only_expired() -> anyhow::Result<()> {
    let cache = MemoryCache::new();
    cache.put(&CacheKey::platform("a"), "1".into(), Duration::from_secs(1)).await?;
    cache.put(&CacheKey::platform("b"), "2".into(), Duration::from_secs(100)).await?;
    tokio::time::advance(Duration::from_secs(2)).await;

    assert_eq!(cache.purge_expired().await, 1);
    assert_eq!(cache.get(&CacheKey::platform("b")).await?.as_deref(), Some("2"));
    Ok(())
}

#[tokio::test]
async fn remove_clears_entry() -> anyhow::Result<()> {
    let cache = MemoryCache::new();
    let key = CacheKey::platform("wx123");
    cache.put(&key, "v".into(), Duration::from_secs(60)).await?;
    cache.remove(&key).await?;
    assert_eq!(cache.get(&key).await?, None);
    Ok(())
}
