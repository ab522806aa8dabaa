use brokerd::ChannelMap;

#[test]
fn s2_pre_commit_invisibility() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let map = ChannelMap::open_directory(dir.path())?;
    let channel = map.find_channel("c", true)?;

    channel.append(b"a")?;
    assert!(channel.fetch(0, 10)?.is_empty());
    channel.commit()?;
    assert_eq!(channel.fetch(0, 10)?, vec![(0, b"a".to_vec())]);
    Ok(())
}

#[test]
fn s3_crash_before_commit_is_recovered_cleanly() -> anyhow::Result<()> {
    let dir = tempfile::tempdir().expect("tempdir");

    {
        let map = ChannelMap::open_directory(dir.path())?;
        let channel = map.find_channel("c", true)?;
        channel.append(b"a")?;
        channel.commit()?;
        channel.append(b"b")?;
        // `map` and `channel` are dropped here without a second commit,
        // simulating the process being killed mid-flight.
    }

    let map = ChannelMap::open_directory(dir.path())?;
    let channel = map.find_channel("c", false)?;
    assert_eq!(channel.fetch(0, 10)?, vec![(0, b"a".to_vec())]);

    // Invariant 4 (post-crash append continuity): the next append resumes
    // exactly at the last committed offset, silently reusing the space
    // the uncommitted "b" occupied on disk.
    assert_eq!(channel.append(b"x")?, 1);
    channel.commit()?;
    assert_eq!(
        channel.fetch(0, 10)?,
        vec![(0, b"a".to_vec()), (1, b"x".to_vec())]
    );
    Ok(())
}

#[test]
fn durability_survives_reopen_after_commit() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    {
        let map = ChannelMap::open_directory(dir.path())?;
        let channel = map.find_channel("c", true)?;
        for i in 0..20u32 {
            channel.append(&i.to_le_bytes())?;
        }
        channel.commit()?;
    }

    let map = ChannelMap::open_directory(dir.path())?;
    let channel = map.find_channel("c", false)?;
    let messages = channel.fetch(0, u32::MAX)?;
    assert_eq!(messages.len(), 20);
    for (i, (offset, data)) in messages.iter().enumerate() {
        assert_eq!(*offset, i as u64);
        assert_eq!(u32::from_le_bytes(data.as_slice().try_into().unwrap()), i as u32);
    }
    Ok(())
}

#[test]
fn commit_is_idempotent() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let map = ChannelMap::open_directory(dir.path())?;
    let channel = map.find_channel("c", true)?;
    channel.append(b"a")?;
    channel.commit()?;
    channel.commit()?;
    channel.commit()?;
    assert_eq!(channel.fetch(0, 10)?, vec![(0, b"a".to_vec())]);
    Ok(())
}
