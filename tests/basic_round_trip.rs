use brokerd::ChannelMap;

#[test]
fn s1_basic_scenario() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let map = ChannelMap::open_directory(dir.path())?;
    let channel = map.find_channel("c", true)?;

    assert_eq!(channel.append(b"hello")?, 0);
    assert_eq!(channel.append(b"world")?, 1);
    channel.commit()?;

    assert_eq!(
        channel.fetch(0, 10)?,
        vec![(0, b"hello".to_vec()), (1, b"world".to_vec())]
    );
    Ok(())
}

#[test]
fn offsets_are_monotonic_with_no_gaps() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let map = ChannelMap::open_directory(dir.path())?;
    let channel = map.find_channel("c", true)?;

    let offsets: Vec<u64> = (0..50)
        .map(|i| channel.append(format!("msg-{i}").as_bytes()))
        .collect::<brokerd::Result<Vec<u64>>>()?;
    assert_eq!(offsets, (0..50).collect::<Vec<u64>>());
    Ok(())
}

#[test]
fn concurrent_appenders_never_duplicate_an_offset() -> anyhow::Result<()> {
    use std::sync::Arc;
    use std::thread;

    let dir = tempfile::tempdir()?;
    let map = Arc::new(ChannelMap::open_directory(dir.path())?);
    let channel = map.find_channel("c", true)?;

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let channel = channel.clone();
            thread::spawn(move || {
                (0..25)
                    .map(|i| channel.append(format!("{i}").as_bytes()).unwrap())
                    .collect::<Vec<u64>>()
            })
        })
        .collect();

    let mut all_offsets: Vec<u64> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    all_offsets.sort_unstable();
    let expected: Vec<u64> = (0..200).collect();
    assert_eq!(all_offsets, expected);
    Ok(())
}
