//! State machine runs against a scripted peer on the simulated radio

mod common;

use blelink_lib::ad::AdStructure;
use blelink_lib::config::AdvertisingMode;
use blelink_lib::control::{ControlOpcode, ControlTable, terminate_on_request};
use common::*;

#[test]
fn test_advertises_round_robin_at_interval() {
    let mut link = link_with(test_config(), Script::default());
    let channels: Vec<LinkEvent> = (0..4).map(|_| link.step()).collect();
    assert_eq!(
        channels,
        vec![
            LinkEvent::Advertised { channel: 37 },
            LinkEvent::Advertised { channel: 38 },
            LinkEvent::Advertised { channel: 39 },
            LinkEvent::Advertised { channel: 37 },
        ]
    );

    let sent = transmissions(&link);
    assert_eq!(sent.len(), 4);
    for pair in sent.windows(2) {
        assert!(pair[1].2.wrapping_sub(pair[0].2) >= 10_000);
    }
    let advertisement = LinkConfig::default().prepare().unwrap().advertisement;
    assert_eq!(sent[0].1, advertisement);
}

#[test]
fn test_non_connectable_does_not_listen() {
    let config = LinkConfig {
        mode: AdvertisingMode::NonConnectable,
        ..test_config()
    };
    let mut link = link_with(config, Script::default());
    assert_eq!(link.step(), LinkEvent::Advertised { channel: 37 });
    assert!(!link.radio().ops().iter().any(|op| matches!(op, RadioOp::Receive { .. })));
}

#[test]
fn test_scan_response_after_inter_frame_space() {
    let config = LinkConfig {
        scan_response_data: vec![AdStructure::CompleteLocalName("blelink-sr".to_string())],
        ..test_config()
    };
    let script = Script::default().advertising(Some(scan_req_frame(CENTRAL, PERIPHERAL)));
    let mut link = link_with(config, script);

    assert_eq!(
        link.step(),
        LinkEvent::ScanResponseSent {
            channel: 37,
            scanner: CENTRAL
        }
    );

    let listened_at = link
        .radio()
        .ops()
        .iter()
        .find_map(|op| match op {
            RadioOp::Receive { at, .. } => Some(*at),
            _ => None,
        })
        .unwrap();
    let sent = transmissions(&link);
    let (channel, scan_response, at) = &sent[1];
    assert_eq!(*channel, 37);
    assert_eq!(scan_response[0] & 0x0F, u8::from(PduType::ScanRsp));
    assert!(*at >= listened_at + REPLY_DELAY + 150, "SCAN_RSP sent before T_IFS");
    assert!(!link.is_connected());
}

#[test]
fn test_scan_request_for_other_device_ignored() {
    let config = LinkConfig {
        scan_response_data: vec![AdStructure::TxPower(0)],
        ..test_config()
    };
    let other = DeviceAddress::from_u64(0xAABB_CCDD_EEFF);
    let script = Script::default().advertising(Some(scan_req_frame(CENTRAL, other)));
    let mut link = link_with(config, script);

    assert_eq!(
        link.step(),
        LinkEvent::Ignored {
            pdu_type: Some(PduType::ScanReq)
        }
    );
    assert_eq!(transmissions(&link).len(), 1);
}

#[test]
fn test_scan_request_without_scan_response_ignored() {
    let script = Script::default().advertising(Some(scan_req_frame(CENTRAL, PERIPHERAL)));
    let mut link = link_with(test_config(), script);
    assert!(matches!(link.step(), LinkEvent::Ignored { .. }));
    assert_eq!(transmissions(&link).len(), 1);
}

#[test]
fn test_malformed_advertising_frame_discarded() {
    let script = Script::default().advertising(Some(vec![0x05, 0x30, 0x00]));
    let mut link = link_with(test_config(), script);
    assert_eq!(
        link.step(),
        LinkEvent::FrameDiscarded {
            error: LinkError::MalformedFrame(FrameDefect::OverLimit { declared: 48, max: 37 })
        }
    );
    assert_eq!(link.state(), &State::Advertising);
}

#[test]
fn test_connect_flow_and_acknowledgment() {
    let script = Script::default()
        .advertising(Some(connect_req_frame(connect_params())))
        .data(Some(empty_pdu(false, false)))
        .data(Some(empty_pdu(true, true)));
    let mut link = link_with(test_config(), script);

    assert_eq!(
        link.step(),
        LinkEvent::ConnectRequested {
            initiator: CENTRAL,
            access_address: CONN_AA,
            channel: 7
        }
    );
    assert_eq!(link.state().name(), "CONNECT_REQUEST");

    assert_eq!(
        link.step(),
        LinkEvent::Connected {
            access_address: CONN_AA,
            channel: 7
        }
    );
    assert_eq!(configure_ops(&link), vec![(ADV_ACCESS_ADDRESS, ADV_CRC_INIT), (CONN_AA, CONN_CRC)]);
    // LLID control, NESN 1, SN 0
    assert_eq!(link.radio().peer().received.last().unwrap(), &vec![0x07, 0x00]);

    assert_eq!(
        link.step(),
        LinkEvent::DataReceived {
            channel: 14,
            llid: Llid::DataContinue,
            len: 0,
            duplicate: false
        }
    );
    // Peer acknowledged our SN 0, we expect its SN 0 next
    assert_eq!(link.radio().peer().received.last().unwrap(), &vec![0x0B, 0x00]);

    let connection = link.state().connection().unwrap();
    assert_eq!(connection.event_counter(), 1);
    assert_eq!(connection.missed(), 0);
    assert!(connection.ack().transmit_seq());
    assert!(!connection.ack().next_expected());
}

#[test]
fn test_first_data_pdu_is_acknowledged_even_if_malformed() {
    let script = Script::default()
        .advertising(Some(connect_req_frame(connect_params())))
        .data(Some(vec![0x09, 0x40]));
    let mut link = link_with(test_config(), script);
    link.step();
    assert!(matches!(link.step(), LinkEvent::Connected { .. }));
    // Header 0x09: SN 1, NESN 0. SN 1 is not the expected 0, NESN matches ours.
    assert_eq!(link.radio().peer().received.last().unwrap(), &vec![0x03, 0x00]);
}

#[test]
fn test_anchor_advances_by_whole_intervals() {
    let mut link = connected_link(test_config(), vec![Some(empty_pdu(true, true)), Some(empty_pdu(false, false))]);
    let first_anchor = link.state().connection().unwrap().anchor();
    link.step();
    link.step();
    let connection = link.state().connection().unwrap();
    assert_eq!(connection.anchor().wrapping_sub(first_anchor), 2 * 12_500);
}

#[test]
fn test_receive_window_opens_at_offset() {
    let mut link = connected_link(test_config(), vec![Some(empty_pdu(true, true))]);
    link.radio_mut().clear_ops();
    link.step();
    let anchor = link.state().connection().unwrap().anchor();
    let opened = link
        .radio()
        .ops()
        .iter()
        .find_map(|op| match op {
            RadioOp::Receive { channel, at } => Some((*channel, *at)),
            _ => None,
        })
        .unwrap();
    assert_eq!(opened.0, 14);
    let offset = opened.1.wrapping_sub(anchor);
    assert!((5_000..7_500).contains(&offset), "window opened at +{}", offset);
}

#[test]
fn test_duplicate_pdu_does_not_advance_state() {
    let mut link = connected_link(test_config(), vec![Some(empty_pdu(true, true)), Some(empty_pdu(true, true))]);
    link.step();
    let before = link.state().connection().unwrap().ack();

    assert_eq!(
        link.step(),
        LinkEvent::DataReceived {
            channel: 21,
            llid: Llid::DataContinue,
            len: 0,
            duplicate: true
        }
    );
    assert_eq!(link.state().connection().unwrap().ack(), before);
    // Same acknowledgment is repeated
    let received = &link.radio().peer().received;
    assert_eq!(received[received.len() - 1], received[received.len() - 2]);
}

#[test]
fn test_three_missed_windows_return_to_advertising() {
    let mut link = connected_link(test_config(), vec![]);

    assert_eq!(
        link.step(),
        LinkEvent::EventMissed {
            error: LinkError::WindowMiss { event_counter: 1 },
            missed: 1
        }
    );
    assert_eq!(
        link.step(),
        LinkEvent::EventMissed {
            error: LinkError::WindowMiss { event_counter: 2 },
            missed: 2
        }
    );
    match link.step() {
        LinkEvent::ConnectionLost {
            error: LinkError::SupervisionTimeout {
                elapsed_ticks,
                budget_ticks,
            },
        } => {
            assert_eq!(budget_ticks, 40_000);
            assert!(elapsed_ticks > 40_000);
        }
        other => panic!("Expected ConnectionLost, got {:?}", other),
    }

    assert_eq!(link.state(), &State::Advertising);
    assert_eq!(configure_ops(&link).last(), Some(&(ADV_ACCESS_ADDRESS, ADV_CRC_INIT)));
    // The radio stays idle outside the windows
    assert!(matches!(
        link.radio().ops()[link.radio().ops().len() - 2],
        RadioOp::Idle { .. }
    ));
    assert!(matches!(link.step(), LinkEvent::Advertised { .. }));
}

#[test]
fn test_received_frame_resets_miss_counter() {
    let mut link = connected_link(test_config(), vec![None, None, Some(empty_pdu(true, true)), None, None]);
    link.step();
    link.step();
    assert!(matches!(link.step(), LinkEvent::DataReceived { .. }));
    assert_eq!(link.state().connection().unwrap().missed(), 0);
    assert!(matches!(link.step(), LinkEvent::EventMissed { missed: 1, .. }));
    assert!(matches!(link.step(), LinkEvent::EventMissed { missed: 2, .. }));
    assert!(link.is_connected());
}

#[test]
fn test_degenerate_channel_map_rejected() {
    let params = ConnectParams {
        channel_map: ChannelMap::from_channels(&[3]),
        ..connect_params()
    };
    let script = Script::default().advertising(Some(connect_req_frame(params)));
    let mut link = link_with(test_config(), script);

    assert_eq!(
        link.step(),
        LinkEvent::ConnectionRejected {
            initiator: CENTRAL,
            error: LinkError::DegenerateChannelMap { used: 1 }
        }
    );
    assert_eq!(link.state(), &State::Advertising);
    assert_eq!(configure_ops(&link).len(), 1);
}

#[test]
fn test_connect_request_for_other_device_ignored() {
    let params = ConnectParams {
        advertiser: DeviceAddress::from_u64(0x0102_0304_0506),
        ..connect_params()
    };
    let script = Script::default().advertising(Some(connect_req_frame(params)));
    let mut link = link_with(test_config(), script);
    assert_eq!(
        link.step(),
        LinkEvent::Ignored {
            pdu_type: Some(PduType::ConnectReq)
        }
    );
    assert_eq!(link.state(), &State::Advertising);
}

#[test]
fn test_scannable_mode_rejects_connect_request() {
    let config = LinkConfig {
        mode: AdvertisingMode::Scannable,
        ..test_config()
    };
    let script = Script::default().advertising(Some(connect_req_frame(connect_params())));
    let mut link = link_with(config, script);
    assert!(matches!(link.step(), LinkEvent::Ignored { .. }));
    assert!(!link.is_connected());
}

#[test]
fn test_connected_never_processes_advertising_pdus() {
    // A CONNECT_REQ arriving on the data channel is just an odd data PDU
    let mut link = connected_link(test_config(), vec![Some(connect_req_frame(connect_params()))]);
    let event = link.step();
    assert!(matches!(event, LinkEvent::DataReceived { len: 34, .. }), "{:?}", event);
    assert!(link.is_connected());
    assert_eq!(configure_ops(&link).len(), 2);
    assert_eq!(link.state().connection().unwrap().context().access_address(), CONN_AA);
}

#[test]
fn test_malformed_data_frame_discarded() {
    let mut link = connected_link(test_config(), vec![Some(vec![0x01, 0x05, 0xAA])]);
    let before = link.state().connection().unwrap().ack();
    assert!(matches!(
        link.step(),
        LinkEvent::FrameDiscarded {
            error: LinkError::MalformedFrame(FrameDefect::Truncated { .. })
        }
    ));
    assert_eq!(link.state().connection().unwrap().ack(), before);
    assert!(link.is_connected());
}

#[test]
fn test_terminate_handler_ends_connection() {
    let terminate = data_frame(Llid::Control, true, true, &[0x02, 0x13]);
    let mut link = connected_link(test_config(), vec![Some(terminate)]);
    link.controls_mut()
        .register(ControlOpcode::TerminateInd, terminate_on_request);

    assert_eq!(link.step(), LinkEvent::Terminated { reason: Some(0x13) });
    assert_eq!(link.state(), &State::Advertising);

    let ops = link.radio().ops();
    let tail = &ops[ops.len() - 3..];
    assert!(matches!(tail[0], RadioOp::Transmit { .. }), "acknowledged before teardown");
    assert!(matches!(tail[1], RadioOp::Idle { .. }));
    assert_eq!(
        tail[2],
        RadioOp::Configure {
            access_address: ADV_ACCESS_ADDRESS,
            crc_init: ADV_CRC_INIT,
            phy: Phy::Le1M
        }
    );
}

#[test]
fn test_control_pdu_without_handler_is_acknowledged() {
    let terminate = data_frame(Llid::Control, true, true, &[0x02, 0x13]);
    let script = Script::default()
        .advertising(Some(connect_req_frame(connect_params())))
        .data(Some(empty_pdu(false, false)))
        .data(Some(terminate));
    let mut link = link_with(test_config(), script).with_controls(ControlTable::new());
    link.step();
    link.step();
    assert_eq!(
        link.step(),
        LinkEvent::DataReceived {
            channel: 14,
            llid: Llid::Control,
            len: 2,
            duplicate: false
        }
    );
    assert!(link.is_connected());
}

#[test]
fn test_connection_across_tick_wrap() {
    let script = Script::default()
        .advertising(Some(connect_req_frame(connect_params())))
        .data(Some(empty_pdu(false, false)))
        .data(Some(empty_pdu(true, true)))
        .data(Some(empty_pdu(false, false)))
        .data(Some(empty_pdu(true, true)));
    let mut link = link_starting_at(u32::MAX - 20_000, test_config(), script);
    link.step();
    link.step();
    for expected_channel in [14, 21, 28] {
        match link.step() {
            LinkEvent::DataReceived { channel, duplicate, .. } => {
                assert_eq!(channel, expected_channel);
                assert!(!duplicate);
            }
            other => panic!("Expected DataReceived, got {:?}", other),
        }
    }
    assert!(link.state().connection().unwrap().anchor() < 100_000);
}
