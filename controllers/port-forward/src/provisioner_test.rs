//! Unit tests for the provisioning orchestrator

#[cfg(test)]
mod tests {
    use crate::error::ControllerError;
    use crate::provisioner::{CreatePoolRequest, PortForwardOptions, ALLOCATION_ATTEMPTS};
    use crate::test_utils::*;
    use allocator::RangeOverride;
    use inventory::{InventoryStore, RuleStatus};
    use std::collections::BTreeSet;
    use std::net::Ipv4Addr;
    use uuid::Uuid;
    use vyos_client::DeviceApiError;
    use vyos_commands::{Op, PortKind, Protocol};

    const MAC1: &str = "52:54:00:00:00:01";
    const MAC2: &str = "52:54:00:00:00:02";

    #[tokio::test]
    async fn test_provision_commits_rows_and_rules() {
        let h = harness();
        let response = h
            .provisioner
            .provision(provision_request("vm1", MAC1, &[PortKind::Ssh, PortKind::Http]))
            .await
            .unwrap();

        assert_eq!(response.status, "committed");
        assert_eq!(response.internal_address, Ipv4Addr::new(192, 168, 1, 10));
        assert_eq!(response.ports[&PortKind::Ssh], 2200);
        assert_eq!(response.ports[&PortKind::Http], 2201);
        assert_eq!(response.nat_rule_base, Some(10000));

        // One set batch per rule, in row order
        let applied = h.device.applied();
        assert_eq!(applied.len(), 2);
        assert!(applied.iter().all(|b| b.op == Op::Set));
        assert!(applied[0].commands[0].starts_with("set nat destination rule 10000 "));
        assert!(applied[1].commands[0].starts_with("set nat destination rule 10001 "));

        let rules = h.device.rules();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].description.as_deref(), Some("vm1 SSH"));
        assert_eq!(rules[0].destination_port, Some(2200));
        assert_eq!(rules[0].translation_address, Some(Ipv4Addr::new(192, 168, 1, 10)));
        assert_eq!(rules[0].translation_port, Some(22));
        assert_eq!(rules[1].description.as_deref(), Some("vm1 HTTP"));
        assert_eq!(rules[1].translation_port, Some(80));

        let view = h.provisioner.get_endpoint("vm1").await.unwrap();
        assert_eq!(view.rules.len(), 2);
        assert!(view.rules.iter().all(|r| r.status == RuleStatus::Enabled));
    }

    #[tokio::test]
    async fn test_second_endpoint_gets_next_free_values() {
        let h = harness();
        h.provisioner
            .provision(provision_request("vm1", MAC1, &[PortKind::Ssh]))
            .await
            .unwrap();
        let second = h
            .provisioner
            .provision(provision_request("vm2", MAC2, &[PortKind::Ssh]))
            .await
            .unwrap();

        assert_eq!(second.internal_address, Ipv4Addr::new(192, 168, 1, 11));
        assert_eq!(second.ports[&PortKind::Ssh], 2201);
        assert_eq!(second.nat_rule_base, Some(10001));
    }

    #[tokio::test]
    async fn test_provision_without_ports() {
        let h = harness();
        let response = h
            .provisioner
            .provision(provision_request("vm1", MAC1, &[]))
            .await
            .unwrap();
        assert!(response.ports.is_empty());
        assert_eq!(response.nat_rule_base, None);
        assert!(h.device.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_provision_rejects_bad_requests() {
        let h = harness();
        h.provisioner
            .provision(provision_request("vm1", MAC1, &[PortKind::Ssh]))
            .await
            .unwrap();

        let duplicate = h.provisioner.provision(provision_request("vm1", MAC2, &[])).await;
        assert!(matches!(duplicate, Err(ControllerError::Conflict(_))));

        let same_mac = h.provisioner.provision(provision_request("vm2", MAC1, &[])).await;
        assert!(matches!(same_mac, Err(ControllerError::Conflict(_))));

        let bad_mac = h.provisioner.provision(provision_request("vm3", "not-a-mac", &[])).await;
        assert!(matches!(bad_mac, Err(ControllerError::InvalidRequest(_))));

        let bad_id = h.provisioner.provision(provision_request("vm 3", MAC2, &[])).await;
        assert!(matches!(bad_id, Err(ControllerError::InvalidRequest(_))));

        let repeated = h
            .provisioner
            .provision(provision_request("vm3", MAC2, &[PortKind::Ssh, PortKind::Ssh]))
            .await;
        assert!(matches!(repeated, Err(ControllerError::InvalidRequest(_))));

        let mut taken = provision_request("vm3", MAC2, &[]);
        taken.internal_address = Some(Ipv4Addr::new(192, 168, 1, 10));
        assert!(matches!(
            h.provisioner.provision(taken).await,
            Err(ControllerError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_explicit_address_and_range_override() {
        let h = harness();
        let mut request = provision_request("vm1", MAC1, &[PortKind::Rdp]);
        request.internal_address = Some(Ipv4Addr::new(192, 168, 1, 200));
        request.range_override = Some(RangeOverride {
            port_start: Some(2900),
            ..Default::default()
        });

        let response = h.provisioner.provision(request).await.unwrap();
        assert_eq!(response.internal_address, Ipv4Addr::new(192, 168, 1, 200));
        assert_eq!(response.ports[&PortKind::Rdp], 2900);
    }

    #[tokio::test]
    async fn test_exhaustion_persists_nothing() {
        let h = harness();
        let mut request = provision_request("vm1", MAC1, &[PortKind::Ssh, PortKind::Http]);
        request.range_override = Some(RangeOverride {
            port_start: Some(2200),
            port_end: Some(2200),
            ..Default::default()
        });

        match h.provisioner.provision(request).await {
            Err(ControllerError::ResourceExhausted(range)) => assert_eq!(range, "2200-2200"),
            other => panic!("expected exhaustion, got {:?}", other),
        }
        assert!(h.store.list_endpoints().await.unwrap().is_empty());
        assert!(h.device.submitted().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_provisions_claim_distinct_values() {
        let h = harness();
        let mut handles = Vec::new();
        for i in 0..20u8 {
            let provisioner = h.provisioner.clone();
            handles.push(tokio::spawn(async move {
                let request = provision_request(
                    &format!("vm{}", i),
                    &format!("52:54:00:00:01:{:02x}", i),
                    &[PortKind::Ssh, PortKind::Http],
                );
                provisioner.provision(request).await
            }));
        }

        let mut addresses = BTreeSet::new();
        let mut ports = BTreeSet::new();
        for handle in handles {
            let response = handle.await.unwrap().unwrap();
            assert!(addresses.insert(response.internal_address));
            for port in response.ports.values() {
                assert!(ports.insert(*port), "port {} claimed twice", port);
            }
        }
        assert_eq!(addresses.len(), 20);
        assert_eq!(ports.len(), 40);

        let numbers: BTreeSet<u32> = h.device.rules().iter().map(|r| r.number).collect();
        assert_eq!(numbers.len(), 40);
        let used = h.store.used_values().await.unwrap();
        assert_eq!(used.nat_rules, numbers);
    }

    #[tokio::test]
    async fn test_lost_allocation_race_rescans() {
        let (h, racing) = racing_harness();
        racing.lose_next(1);

        let response = h
            .provisioner
            .provision(provision_request("vm1", MAC1, &[PortKind::Ssh]))
            .await
            .unwrap();
        assert_eq!(racing.lost(), 1);
        assert_eq!(response.ports[&PortKind::Ssh], 2200);
        assert_eq!(h.device.rules().len(), 1);

        racing.lose_next(1);
        let rule = h
            .provisioner
            .add_port_forward("vm1", PortKind::Http, PortForwardOptions::default())
            .await
            .unwrap();
        assert_eq!(racing.lost(), 2);
        assert_eq!(rule.external_port, 2201);
        assert_eq!(h.device.rules().len(), 2);
    }

    #[tokio::test]
    async fn test_allocation_gives_up_after_repeated_races() {
        let (h, racing) = racing_harness();
        racing.lose_next(ALLOCATION_ATTEMPTS);

        let result = h
            .provisioner
            .provision(provision_request("vm1", MAC1, &[PortKind::Ssh]))
            .await;
        match result {
            Err(ControllerError::Conflict(msg)) => assert!(msg.contains("external_port"), "{}", msg),
            other => panic!("expected conflict, got {:?}", other),
        }
        assert_eq!(racing.lost(), ALLOCATION_ATTEMPTS);
        assert!(h.store.get_endpoint("vm1").await.unwrap().is_none());
        assert!(h.device.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_device_rejection_rolls_back() {
        let h = harness();
        h.device.fail_when("rule 10001", rejected("invalid translation"));

        let result = h
            .provisioner
            .provision(provision_request("vm1", MAC1, &[PortKind::Ssh, PortKind::Http]))
            .await;
        match result {
            Err(ControllerError::Device(DeviceApiError::Rejected { message, .. })) => {
                assert_eq!(message, "invalid translation");
            }
            other => panic!("expected device rejection, got {:?}", other),
        }

        // The first rule was applied, then deleted again
        let applied = h.device.applied();
        assert_eq!(applied.len(), 2);
        assert_eq!(applied[1].op, Op::Delete);
        assert_eq!(applied[1].commands, vec!["delete nat destination rule 10000"]);
        assert!(h.device.rules().is_empty());
        assert!(h.store.get_endpoint("vm1").await.unwrap().is_none());

        // Released values are handed out again
        h.device.clear_failures();
        let retry = h
            .provisioner
            .provision(provision_request("vm1", MAC1, &[PortKind::Ssh]))
            .await
            .unwrap();
        assert_eq!(retry.nat_rule_base, Some(10000));
    }

    #[tokio::test]
    async fn test_lost_response_is_compensated() {
        let h = harness();
        h.device.fail_after_apply("rule 10000 translation port", transport_error());

        let result = h
            .provisioner
            .provision(provision_request("vm1", MAC1, &[PortKind::Ssh]))
            .await;
        assert!(matches!(result, Err(ControllerError::Device(DeviceApiError::Transport(_)))));

        // The device did apply the rule, so it must be deleted
        assert!(h.device.rules().is_empty());
        assert!(h.store.get_endpoint("vm1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unanswered_rule_that_never_landed() {
        let h = harness();
        h.device.fail_times("rule 10000", transport_error(), 1);

        let result = h
            .provisioner
            .provision(provision_request("vm1", MAC1, &[PortKind::Ssh]))
            .await;

        // The re-delete is rejected, then confirmed absent
        assert!(matches!(result, Err(ControllerError::Device(DeviceApiError::Transport(_)))));
        let submitted = h.device.submitted();
        assert_eq!(submitted.len(), 2);
        assert_eq!(submitted[1].commands, vec!["delete nat destination rule 10000"]);
        assert!(h.device.applied().is_empty());
    }

    #[tokio::test]
    async fn test_failed_compensation_reports_inconsistent_state() {
        let h = harness();
        h.device.fail_when("set nat destination rule 10001", rejected("commit failed"));
        h.device.fail_when("delete nat destination rule 10000", transport_error());

        let result = h
            .provisioner
            .provision(provision_request("vm1", MAC1, &[PortKind::Ssh, PortKind::Http]))
            .await;
        match result {
            Err(ControllerError::InconsistentState(detail)) => {
                assert!(detail.contains("rule 10000 left on device"), "{}", detail);
                assert!(detail.contains("commit failed"), "{}", detail);
            }
            other => panic!("expected inconsistent state, got {:?}", other),
        }

        // Both attempts were made
        let deletes = h
            .device
            .submitted()
            .into_iter()
            .filter(|b| b.op == Op::Delete)
            .count();
        assert_eq!(deletes, 2);
        assert!(h.store.get_endpoint("vm1").await.unwrap().is_none());
        assert_eq!(h.device.rules().len(), 1);

        // The next pass removes the orphan
        h.device.clear_failures();
        let report = h.reconciler.run().await.unwrap();
        assert_eq!(report.deleted, vec!["vm1 SSH (rule 10000)"]);
        assert!(h.device.rules().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_provision_is_rolled_back() {
        let h = harness();
        h.shutdown.send(true).unwrap();

        let result = h
            .provisioner
            .provision(provision_request("vm1", MAC1, &[PortKind::Ssh]))
            .await;
        assert!(matches!(result, Err(ControllerError::Cancelled)));
        assert!(h.store.get_endpoint("vm1").await.unwrap().is_none());
        assert!(h.device.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_decommission_deletes_rules_then_rows() {
        let h = harness();
        h.provisioner
            .provision(provision_request("vm1", MAC1, &[PortKind::Ssh, PortKind::Http, PortKind::Https]))
            .await
            .unwrap();
        h.provisioner
            .remove_port_forward("vm1", PortKind::Https)
            .await
            .unwrap();
        h.device.clear_log();

        let response = h.provisioner.decommission("vm1").await.unwrap();
        assert_eq!(response.deleted_rules, vec![10000, 10001]);

        // One delete batch per declared rule
        let applied = h.device.applied();
        assert_eq!(applied.len(), 2);
        assert!(applied.iter().all(|b| b.op == Op::Delete && b.len() == 1));
        assert!(h.device.rules().is_empty());
        assert!(h.store.get_endpoint("vm1").await.unwrap().is_none());
        assert!(h.store.used_values().await.unwrap().nat_rules.is_empty());
    }

    #[tokio::test]
    async fn test_decommission_failure_keeps_endpoint() {
        let h = harness();
        h.provisioner
            .provision(provision_request("vm1", MAC1, &[PortKind::Ssh, PortKind::Http]))
            .await
            .unwrap();
        h.device.fail_when("delete nat destination rule 10001", transport_error());

        let result = h.provisioner.decommission("vm1").await;
        assert!(matches!(
            result,
            Err(ControllerError::DecommissionIncomplete { ref machine_id, .. }) if machine_id == "vm1"
        ));
        let view = h.provisioner.get_endpoint("vm1").await.unwrap();
        assert_eq!(view.rules.len(), 2);
    }

    #[tokio::test]
    async fn test_decommission_tolerates_rule_already_gone() {
        let h = harness();
        h.provisioner
            .provision(provision_request("vm1", MAC1, &[PortKind::Ssh]))
            .await
            .unwrap();
        h.device
            .run_commands(&["delete nat destination rule 10000".to_string()]);

        h.provisioner.decommission("vm1").await.unwrap();
        assert!(h.store.get_endpoint("vm1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_decommission_unknown_endpoint() {
        let h = harness();
        assert!(matches!(
            h.provisioner.decommission("ghost").await,
            Err(ControllerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_add_and_remove_port_forward() {
        let h = harness();
        h.provisioner
            .provision(provision_request("vm1", MAC1, &[PortKind::Ssh]))
            .await
            .unwrap();

        let options = PortForwardOptions {
            protocol: Some(Protocol::TcpUdp),
            source_address: Some("203.0.113.0/24".to_string()),
            ..Default::default()
        };
        let rule = h
            .provisioner
            .add_port_forward("vm1", PortKind::Https, options)
            .await
            .unwrap();
        assert_eq!(rule.external_port, 2201);
        assert_eq!(rule.nat_rule_number, 10001);

        let on_device = h.device.rules();
        let https = on_device.iter().find(|r| r.number == 10001).unwrap();
        assert_eq!(https.protocol, Some(Protocol::TcpUdp));
        assert_eq!(https.source_address.as_deref(), Some("203.0.113.0/24"));

        assert!(matches!(
            h.provisioner
                .add_port_forward("vm1", PortKind::Https, PortForwardOptions::default())
                .await,
            Err(ControllerError::Conflict(_))
        ));

        let removed = h
            .provisioner
            .remove_port_forward("vm1", PortKind::Https)
            .await
            .unwrap();
        assert_eq!(removed.status, RuleStatus::NotActive);
        assert!(h.device.rules().iter().all(|r| r.number != 10001));

        // Re-adding reuses the reserved values
        let again = h
            .provisioner
            .add_port_forward("vm1", PortKind::Https, PortForwardOptions::default())
            .await
            .unwrap();
        assert_eq!((again.external_port, again.nat_rule_number), (2201, 10001));
        assert_eq!(again.status, RuleStatus::Enabled);
    }

    #[tokio::test]
    async fn test_failed_reactivation_restores_row() {
        let h = harness();
        h.provisioner
            .provision(provision_request("vm1", MAC1, &[PortKind::Ssh]))
            .await
            .unwrap();
        h.provisioner
            .remove_port_forward("vm1", PortKind::Ssh)
            .await
            .unwrap();
        h.device.fail_when("set nat destination rule 10000", rejected("no"));

        let result = h
            .provisioner
            .add_port_forward("vm1", PortKind::Ssh, PortForwardOptions::default())
            .await;
        assert!(matches!(result, Err(ControllerError::Device(_))));

        let view = h.provisioner.get_endpoint("vm1").await.unwrap();
        assert_eq!(view.rules[0].status, RuleStatus::NotActive);
    }

    #[tokio::test]
    async fn test_failed_add_removes_new_row() {
        let h = harness();
        h.provisioner
            .provision(provision_request("vm1", MAC1, &[]))
            .await
            .unwrap();
        h.device.fail_when("rule 10000", rejected("no"));

        let result = h
            .provisioner
            .add_port_forward("vm1", PortKind::Http, PortForwardOptions::default())
            .await;
        assert!(matches!(result, Err(ControllerError::Device(_))));
        assert!(h.provisioner.get_endpoint("vm1").await.unwrap().rules.is_empty());
    }

    #[tokio::test]
    async fn test_remove_failure_leaves_row() {
        let h = harness();
        h.provisioner
            .provision(provision_request("vm1", MAC1, &[PortKind::Ssh]))
            .await
            .unwrap();
        h.device.fail_when("delete", transport_error());

        assert!(h
            .provisioner
            .remove_port_forward("vm1", PortKind::Ssh)
            .await
            .is_err());
        let view = h.provisioner.get_endpoint("vm1").await.unwrap();
        assert_eq!(view.rules[0].status, RuleStatus::Enabled);
    }

    #[tokio::test]
    async fn test_remove_tolerates_rule_already_gone() {
        let h = harness();
        h.provisioner
            .provision(provision_request("vm1", MAC1, &[PortKind::Ssh]))
            .await
            .unwrap();
        h.device
            .run_commands(&["delete nat destination rule 10000".to_string()]);

        let removed = h
            .provisioner
            .remove_port_forward("vm1", PortKind::Ssh)
            .await
            .unwrap();
        assert_eq!(removed.status, RuleStatus::NotActive);
    }

    #[tokio::test]
    async fn test_disable_and_enable_rule() {
        let h = harness();
        h.provisioner
            .provision(provision_request("vm1", MAC1, &[PortKind::Ssh]))
            .await
            .unwrap();

        let rule = h
            .provisioner
            .set_rule_enabled("vm1", PortKind::Ssh, false)
            .await
            .unwrap();
        assert_eq!(rule.status, RuleStatus::Disabled);
        assert!(h.device.rules()[0].disabled);

        // Disabled rules are still declared, so reconciliation keeps them
        let report = h.reconciler.run().await.unwrap();
        assert_eq!(report.unchanged, vec!["vm1 SSH (rule 10000)"]);

        h.device.clear_log();
        let rule = h
            .provisioner
            .set_rule_enabled("vm1", PortKind::Ssh, true)
            .await
            .unwrap();
        assert_eq!(rule.status, RuleStatus::Enabled);
        assert!(!h.device.rules()[0].disabled);
        assert_eq!(
            h.device.applied()[0].commands,
            vec!["delete nat destination rule 10000 disable"]
        );

        assert!(matches!(
            h.provisioner.set_rule_enabled("vm1", PortKind::Rdp, true).await,
            Err(ControllerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_pools() {
        let h = harness();
        let pool = h
            .provisioner
            .create_pool(CreatePoolRequest {
                name: "lab".to_string(),
                base: Ipv4Addr::new(10, 0, 5, 0),
                start_octet: 20,
                end_octet: 21,
                description: None,
            })
            .await
            .unwrap();

        let duplicate = h
            .provisioner
            .create_pool(CreatePoolRequest {
                name: "lab".to_string(),
                base: Ipv4Addr::new(10, 0, 6, 0),
                start_octet: 1,
                end_octet: 2,
                description: None,
            })
            .await;
        assert!(matches!(duplicate, Err(ControllerError::Conflict(_))));
        assert_eq!(h.provisioner.list_pools().await.unwrap().len(), 1);

        let mut request = provision_request("vm1", MAC1, &[PortKind::Ssh]);
        request.pool_id = Some(pool.id);
        let response = h.provisioner.provision(request).await.unwrap();
        assert_eq!(response.internal_address, Ipv4Addr::new(10, 0, 5, 20));
        assert_eq!(h.device.rules()[0].translation_address, Some(Ipv4Addr::new(10, 0, 5, 20)));

        let mut unknown = provision_request("vm2", MAC2, &[]);
        unknown.pool_id = Some(Uuid::new_v4());
        assert!(matches!(
            h.provisioner.provision(unknown).await,
            Err(ControllerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_operations_are_counted() {
        let h = harness();
        h.provisioner
            .provision(provision_request("vm1", MAC1, &[PortKind::Ssh]))
            .await
            .unwrap();
        let _ = h.provisioner.decommission("ghost").await;

        let text = h.metrics.render().unwrap();
        assert!(text.contains(r#"provision_operations_total{operation="provision",outcome="committed"} 1"#));
        assert!(text.contains(r#"provision_operations_total{operation="decommission",outcome="rejected"} 1"#));
    }
}
