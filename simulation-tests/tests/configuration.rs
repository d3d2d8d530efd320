use flotilla::members::test_utils::{
    create_test_manager,
    test_addr,
    test_broker,
    test_config,
    LocalNetwork,
    MemGroup,
    NetworkEvent,
    TEST_SHARDS,
};
use flotilla::members::{Errc, PartitionAllocator};
use futures::StreamExt;

#[tokio::test]
async fn snapshot_with_addition_and_removal() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt::try_init();

    let group = MemGroup::with_members([test_broker(1), test_broker(2), test_broker(3)], Some(1));
    let network = LocalNetwork::default();

    let manager = create_test_manager(&test_config(1, &[1]), &group, &network);
    manager.start().await?;
    assert_eq!(manager.connections().node_ids(), vec![2, 3]);

    let batch = group.commit([test_broker(1), test_broker(3), test_broker(4)]);
    assert_eq!(manager.apply_update(&batch).await?, Errc::Success);

    let allocated = manager
        .allocator()
        .invoke_on(PartitionAllocator::SHARD, |allocator| allocator.node_ids())
        .await?;
    assert_eq!(allocated, vec![1, 2, 3, 4], "Removed nodes stay registered.");

    let tables = manager
        .members_table()
        .invoke_on_all(|table| table.all_broker_ids())
        .await?;
    assert_eq!(tables.len(), TEST_SHARDS);
    for ids in tables {
        assert_eq!(ids, vec![1, 3, 4]);
    }

    assert_eq!(manager.connections().node_ids(), vec![3, 4]);
    assert!(!manager.connections().contains(1));
    assert_eq!(
        network.connection_events(),
        vec![
            NetworkEvent::Connected(test_addr(2)),
            NetworkEvent::Connected(test_addr(3)),
            NetworkEvent::Closed(test_addr(2)),
            NetworkEvent::Connected(test_addr(4)),
        ],
    );

    manager.stop().await;
    Ok(())
}

#[tokio::test]
async fn reapplying_a_snapshot_changes_nothing() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt::try_init();

    let group = MemGroup::with_members([test_broker(1), test_broker(2)], Some(1));
    let network = LocalNetwork::default();

    let manager = create_test_manager(&test_config(1, &[1]), &group, &network);
    manager.start().await?;
    let events = network.events();

    let batch = group.commit([test_broker(2), test_broker(1)]);
    manager.apply_update(&batch).await?;
    manager.apply_update(&batch).await?;

    assert_eq!(network.events(), events);
    assert_eq!(manager.connections().node_ids(), vec![2]);
    assert_eq!(manager.statistics().num_config_updates(), 3);

    let mut changes = manager.membership_changes();
    let last = changes.next().await.expect("Latest diff");
    assert!(last.is_empty());

    manager.stop().await;
    Ok(())
}

#[tokio::test]
async fn diverged_shards_converge() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt::try_init();

    let group = MemGroup::with_members([test_broker(1), test_broker(2)], Some(1));
    let network = LocalNetwork::default();

    let manager = create_test_manager(&test_config(1, &[1]), &group, &network);
    manager.start().await?;

    // Drop a broker from a single non-controller shard.
    manager
        .members_table()
        .invoke_on(TEST_SHARDS - 1, |table| {
            let diff = table.calculate_diff(&flotilla::members::GroupConfiguration::new(
                [test_broker(1)],
                None,
            ));
            table.update_brokers(diff);
        })
        .await?;

    let batch = group.commit([test_broker(1), test_broker(2), test_broker(5)]);
    manager.apply_update(&batch).await?;

    let tables = manager
        .members_table()
        .invoke_on_all(|table| table.all_broker_ids())
        .await?;
    assert!(tables.iter().all(|ids| ids == &vec![1, 2, 5]));
    assert_eq!(manager.connections().node_ids(), vec![2, 5]);

    manager.stop().await;
    Ok(())
}

#[tokio::test]
async fn allocator_keeps_every_observed_node() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt::try_init();

    let group = MemGroup::with_members([test_broker(1)], Some(1));
    let network = LocalNetwork::default();

    let manager = create_test_manager(&test_config(1, &[1]), &group, &network);
    manager.start().await?;

    for members in [vec![1, 2], vec![1, 3], vec![1], vec![1, 4, 2]] {
        let batch = group.commit(members.into_iter().map(test_broker));
        manager.apply_update(&batch).await?;
    }

    let allocated = manager
        .allocator()
        .invoke_on(PartitionAllocator::SHARD, |allocator| allocator.node_ids())
        .await?;
    assert_eq!(allocated, vec![1, 2, 3, 4]);
    assert_eq!(manager.connections().node_ids(), vec![2, 4]);
    assert_eq!(manager.statistics().num_brokers(), 3);

    manager.stop().await;
    Ok(())
}
