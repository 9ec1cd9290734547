use glam::Vec3;
use plasma_net::{
    ConsoleCommandMsg, GameMessage, GameMsg, GameMsgType, GroupOwner, InitialAgeStateSent, KiCommand,
    KiMsg, ListenListUpdate, LoadClone, Location, MemberInfo, MemberUpdate, MembersList, Message,
    PagingRoom, PlayerId, SdlState, Terminated, Uoid, Voice, VoiceListCommand, WireMessage,
    serialize_message,
};

use crate::test_host::MockHost;
use crate::*;

const LOCAL: PlayerId = 100;

fn new_session() -> NetClientSession {
    let mut session = NetClientSession::new(SessionSettings::default(), LOCAL);
    session
        .descriptors_mut()
        .register(Descriptor::new("Door", 1, ["open"]));
    session
}

fn member(id: PlayerId) -> MemberInfo {
    MemberInfo {
        player_id: id,
        player_name: format!("player{id}"),
        address: None,
        port: 0,
        ccr_level: 0,
        avatar: Some(MockHost::avatar_uoid(id)),
        is_server: false,
        peer_to_peer: true,
    }
}

fn door(name: &str) -> Uoid {
    Uoid::new(Location::new(7), 2, name)
}

fn door_state(name: &str, version: u16, initial_state: bool) -> Message {
    let record = StateRecord {
        header: StateHeader {
            descriptor: "Door".to_string(),
            version,
        },
        variables: vec![StateVariable {
            name: "open".to_string(),
            value: vec![1],
            dirty: true,
        }],
    };
    Message::SdlState(SdlState {
        object: door(name),
        player_id: None,
        initial_state,
        dirty_only: false,
        broadcast: false,
        state: record.encode().unwrap(),
    })
}

fn chat(text: &str) -> GameMsg {
    GameMsg::Ki(KiMsg {
        command: KiCommand::ChatMessage,
        sender_name: "player1".to_string(),
        text: text.to_string(),
        flags: 0,
    })
}

fn deliver(session: &mut NetClientSession, host: &mut MockHost, messages: Vec<Message>) {
    for msg in messages {
        session.receive(WireMessage::unstamped(msg));
    }
    session.update(host);
}

fn join_members(session: &mut NetClientSession, host: &mut MockHost, ids: &[PlayerId]) {
    let members = ids.iter().map(|&id| member(id)).collect();
    deliver(session, host, vec![Message::MembersList(MembersList { members })]);
    session.drain_events();
}

// ---------------------------------------------------------------------------
// Roster
// ---------------------------------------------------------------------------

#[test]
fn test_roster_change_notified_once_per_message() {
    let mut session = new_session();
    let mut host = MockHost::default();
    let members = vec![member(1), member(1), member(2), member(LOCAL)];
    deliver(&mut session, &mut host, vec![Message::MembersList(MembersList { members })]);

    assert_eq!(session.transport().len(), 2, "duplicates merged, self skipped");
    assert!(session.transport().member(1).is_some());
    let changes = session
        .drain_events()
        .into_iter()
        .filter(|e| *e == SessionEvent::RosterChanged)
        .count();
    assert_eq!(changes, 1);
}

#[test]
fn test_member_update_add_and_remove() {
    let mut session = new_session();
    let mut host = MockHost::default();
    let add = |id, adding| {
        Message::MemberUpdate(MemberUpdate {
            adding,
            member: member(id),
        })
    };
    deliver(&mut session, &mut host, vec![add(1, true), add(2, true)]);
    assert_eq!(session.transport().len(), 2);

    deliver(&mut session, &mut host, vec![add(1, false), add(9, false)]);
    assert_eq!(session.transport().len(), 1);
    assert!(session.transport().member(1).is_none());
}

#[test]
fn test_members_list_keeps_known_avatar() {
    let mut session = new_session();
    let mut host = MockHost::default();
    join_members(&mut session, &mut host, &[1]);

    let mut bare = member(1);
    bare.avatar = None;
    deliver(
        &mut session,
        &mut host,
        vec![Message::MembersList(MembersList { members: vec![bare] })],
    );
    assert_eq!(
        session.transport().member(1).unwrap().avatar,
        Some(MockHost::avatar_uoid(1))
    );
}

// ---------------------------------------------------------------------------
// State delivery
// ---------------------------------------------------------------------------

#[test]
fn test_initial_states_gate_delivery_until_count_reached() {
    let mut session = new_session();
    let mut host = MockHost::default();
    for name in ["A", "B", "C"] {
        host.add_object(door(name), true);
    }
    session.begin_initial_state_load();

    deliver(
        &mut session,
        &mut host,
        vec![
            door_state("A", 1, true),
            door_state("B", 1, true),
            Message::InitialAgeStateSent(InitialAgeStateSent {
                num_initial_states: 3,
            }),
        ],
    );
    assert!(host.delivered.is_empty());
    assert_eq!(session.pending().len(), 2);
    assert!(session.is_loading_initial_state());

    deliver(&mut session, &mut host, vec![door_state("C", 1, true)]);
    assert_eq!(host.delivered.len(), 3);
    assert!(session.is_playing());
    assert!(!session.is_loading_initial_state());
    assert!(
        session
            .drain_events()
            .contains(&SessionEvent::AllInitialStatesReceived { count: 3 })
    );
    assert!(host.delivered[0].1.flags.contains(ApplyFlags::MAKE_DIRTY));
}

#[test]
fn test_count_announced_first_then_states() {
    let mut session = new_session();
    let mut host = MockHost::default();
    host.add_object(door("A"), true);
    session.begin_initial_state_load();

    deliver(
        &mut session,
        &mut host,
        vec![Message::InitialAgeStateSent(InitialAgeStateSent {
            num_initial_states: 1,
        })],
    );
    assert!(!session.flags().contains(SessionFlags::NEED_INITIAL_AGE_STATE_COUNT));
    assert!(!session.is_playing());

    deliver(&mut session, &mut host, vec![door_state("A", 1, true)]);
    assert!(session.is_playing());
    assert_eq!(host.delivered.len(), 1);
}

#[test]
fn test_non_initial_state_ignored_while_loading() {
    let mut session = new_session();
    let mut host = MockHost::default();
    host.add_object(door("A"), true);
    session.begin_initial_state_load();

    deliver(&mut session, &mut host, vec![door_state("A", 1, false)]);
    assert!(session.pending().is_empty());
    assert_eq!(session.initial_states().received(), 0);
}

#[test]
fn test_state_for_missing_object_dropped_after_join_completes() {
    let mut session = new_session();
    let mut host = MockHost::default();
    session.link_to_age(AgeLink::new("Cleft")).unwrap();
    session.update(&mut host);
    assert!(session.is_loading_initial_state());

    deliver(
        &mut session,
        &mut host,
        vec![
            door_state("Gone", 1, true),
            Message::InitialAgeStateSent(InitialAgeStateSent {
                num_initial_states: 1,
            }),
        ],
    );
    assert!(session.is_playing());
    assert_eq!(session.pending().len(), 1, "kept while the join is in flight");

    session.age_joined(Ok(()));
    session.update(&mut host);
    assert!(session.pending().is_empty());
    assert!(host.delivered.is_empty());
}

#[test]
fn test_descriptor_mismatch_disables_networking() {
    let mut session = new_session();
    let mut host = MockHost::default();
    host.add_object(door("A"), true);

    deliver(
        &mut session,
        &mut host,
        vec![
            door_state("A", 2, false),
            Message::GroupOwner(GroupOwner { is_owner: true }),
        ],
    );
    assert!(session.pending().is_empty());
    assert!(!session.is_owner(), "messages after the failure wait");
    assert!(session.flags().contains(SessionFlags::DISABLE_ON_NEXT_UPDATE));
    assert_eq!(
        session.send(Message::GroupOwner(GroupOwner { is_owner: false }), 0.0),
        Err(SendError::Disabled)
    );

    session.update(&mut host);
    assert!(session.is_disabled());
    assert!(session.drain_events().contains(&SessionEvent::NetDisabled {
        show_dialog: true,
        reason: SDL_DESC_PROBLEM.to_string(),
    }));

    session.receive(WireMessage::unstamped(door_state("A", 1, false)));
    session.update(&mut host);
    assert!(session.pending().is_empty(), "disabled sessions do nothing");
}

#[test]
fn test_first_disable_reason_wins() {
    let mut session = new_session();
    let mut host = MockHost::default();
    session.queue_disable_net(false, "first");
    session.queue_disable_net(true, "second");
    session.update(&mut host);
    assert_eq!(
        session.drain_events(),
        vec![SessionEvent::NetDisabled {
            show_dialog: false,
            reason: "first".to_string(),
        }]
    );
}

#[test]
fn test_terminated_reports_reason_then_disables() {
    let mut session = new_session();
    let mut host = MockHost::default();
    deliver(
        &mut session,
        &mut host,
        vec![Message::Terminated(Terminated {
            reason: "kicked".to_string(),
        })],
    );
    assert_eq!(
        session.drain_events(),
        vec![SessionEvent::Terminated {
            reason: "kicked".to_string()
        }]
    );
    session.update(&mut host);
    assert!(session.is_disabled());
}

// ---------------------------------------------------------------------------
// Game messages
// ---------------------------------------------------------------------------

#[test]
fn test_incoming_game_messages_are_screened() {
    let mut session = new_session();
    let mut host = MockHost::default();
    join_members(&mut session, &mut host, &[1]);

    let console = GameMsg::ConsoleCommand(ConsoleCommandMsg {
        command: "App.Quit".to_string(),
    });
    let wrap = |msg| {
        Message::GameMessage(GameMessage {
            player_id: Some(1),
            delivery_time_ms: None,
            msg,
        })
    };
    deliver(&mut session, &mut host, vec![wrap(console), wrap(chat("hello"))]);

    let events = session.drain_events();
    assert_eq!(
        events,
        vec![SessionEvent::GameMessage {
            player_id: Some(1),
            msg: chat("hello"),
            deliver_at: None,
        }]
    );
    assert!(
        session
            .transport()
            .member(1)
            .unwrap()
            .transport_flags
            .contains(TransportFlags::SENDING_ACTIONS)
    );
}

#[test]
fn test_delivery_time_converted_to_local_clock() {
    let mut session = new_session();
    let mut host = MockHost::default();
    host.sys_now = 1000.0;
    session.receive(WireMessage::stamped(
        Message::GameMessage(GameMessage {
            player_id: None,
            delivery_time_ms: Some(1_015_000),
            msg: chat("later"),
        }),
        1_010_000,
    ));
    session.update(&mut host);

    assert_eq!(session.server_time_offset(), 10.0);
    let events = session.drain_events();
    let Some(SessionEvent::GameMessage { deliver_at, .. }) = events.first() else {
        panic!("expected a game message, got {events:?}");
    };
    assert_eq!(*deliver_at, Some(1005.0));
}

#[test]
fn test_outgoing_messages_screened_and_stamped() {
    let mut session = new_session();
    let mut host = MockHost::default();
    host.sys_now = 1000.0;
    session.receive(WireMessage::stamped(
        Message::GroupOwner(GroupOwner { is_owner: true }),
        1_010_000,
    ));
    session.update(&mut host);

    let console = GameMsg::ConsoleCommand(ConsoleCommandMsg {
        command: "Net.Disable".to_string(),
    });
    let err = session
        .send(
            Message::GameMessage(GameMessage {
                player_id: Some(LOCAL),
                delivery_time_ms: None,
                msg: console,
            }),
            1000.0,
        )
        .unwrap_err();
    assert_eq!(err, SendError::Screened(GameMsgType::ConsoleCommand));

    session
        .send(
            Message::GameMessage(GameMessage {
                player_id: Some(LOCAL),
                delivery_time_ms: None,
                msg: chat("hi"),
            }),
            1000.0,
        )
        .unwrap();
    let out = session.drain_outgoing();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].channel, NetChannel::Default);
    assert_eq!(out[0].wire.sent_at_ms, 1_010_000);
}

#[test]
fn test_silenced_player_cannot_chat_or_talk() {
    let mut session = new_session();
    session.set_silenced(true);
    let chat_msg = Message::GameMessage(GameMessage {
        player_id: Some(LOCAL),
        delivery_time_ms: None,
        msg: chat("hi"),
    });
    assert_eq!(session.send(chat_msg, 0.0), Err(SendError::Silenced));
    let voice = Message::Voice(Voice {
        player_id: LOCAL,
        num_frames: 1,
        flags: 0,
        data: vec![1],
        receivers: vec![],
    });
    assert_eq!(session.send(voice, 0.0), Err(SendError::Silenced));
    session
        .send(Message::GroupOwner(GroupOwner { is_owner: false }), 0.0)
        .unwrap();
}

#[test]
fn test_paging_held_until_playing() {
    let mut session = new_session();
    let mut host = MockHost::default();
    let paging = Message::PagingRoom(PagingRoom {
        player_id: LOCAL,
        rooms: vec![Location::new(7)],
        paging_out: false,
    });
    session.send(paging, 0.0).unwrap();
    assert!(session.drain_outgoing().is_empty());
    assert_eq!(session.held_paging_len(), 1);

    session.begin_initial_state_load();
    deliver(
        &mut session,
        &mut host,
        vec![Message::InitialAgeStateSent(InitialAgeStateSent {
            num_initial_states: 0,
        })],
    );
    assert!(session.is_playing());
    let out = session.drain_outgoing();
    assert_eq!(out.len(), 1);
    assert!(matches!(out[0].wire.message, Message::PagingRoom(_)));
}

#[test]
fn test_inbound_paging_is_an_error() {
    let mut session = new_session();
    let mut host = MockHost::default();
    let wire = WireMessage::unstamped(Message::PagingRoom(PagingRoom {
        player_id: 1,
        rooms: vec![],
        paging_out: true,
    }));
    assert_eq!(session.dispatch(wire, &mut host), HandlerStatus::Error);
}

#[test]
fn test_receive_bytes_drops_garbage() {
    let mut session = new_session();
    assert!(!session.receive_bytes(&[]));
    assert!(!session.receive_bytes(&[0xEE, 1, 2]));
    let good = serialize_message(&WireMessage::unstamped(Message::GroupOwner(GroupOwner {
        is_owner: true,
    })))
    .unwrap();
    assert!(session.receive_bytes(&good));
    assert_eq!(session.inbox_len(), 1);
}

// ---------------------------------------------------------------------------
// Clones and ownership
// ---------------------------------------------------------------------------

#[test]
fn test_load_clone_tracks_member_avatar() {
    let mut session = new_session();
    let mut host = MockHost::default();
    let mut info = member(1);
    info.avatar = None;
    deliver(
        &mut session,
        &mut host,
        vec![Message::MembersList(MembersList { members: vec![info] })],
    );
    session.drain_events();

    let clone = |player_id, is_loading| {
        Message::LoadClone(LoadClone {
            player_id,
            clone: MockHost::avatar_uoid(player_id),
            is_player: true,
            is_loading,
            is_initial_state: false,
        })
    };
    deliver(&mut session, &mut host, vec![clone(1, true), clone(2, true)]);
    assert_eq!(
        session.transport().member(1).unwrap().avatar,
        Some(MockHost::avatar_uoid(1))
    );
    let loads = session
        .drain_events()
        .into_iter()
        .filter(|e| matches!(e, SessionEvent::LoadClone(_)))
        .count();
    assert_eq!(loads, 1, "player 2 is not in the age");

    deliver(&mut session, &mut host, vec![clone(1, false)]);
    assert_eq!(session.transport().member(1).unwrap().avatar, None);
}

#[test]
fn test_avatar_unload_forwarded_after_member_left() {
    let mut session = new_session();
    let mut host = MockHost::default();
    join_members(&mut session, &mut host, &[1]);

    deliver(
        &mut session,
        &mut host,
        vec![Message::MemberUpdate(MemberUpdate {
            adding: false,
            member: member(1),
        })],
    );
    session.drain_events();

    let unload = LoadClone {
        player_id: 1,
        clone: MockHost::avatar_uoid(1),
        is_player: true,
        is_loading: false,
        is_initial_state: false,
    };
    deliver(&mut session, &mut host, vec![Message::LoadClone(unload.clone())]);
    assert_eq!(session.drain_events(), vec![SessionEvent::LoadClone(unload)]);
}

#[test]
fn test_everything_locally_owned_once_disabled() {
    let mut session = new_session();
    let mut host = MockHost::default();
    join_members(&mut session, &mut host, &[1]);
    let theirs = MockHost::avatar_uoid(1);
    assert!(!session.is_locally_owned(&theirs));
    assert!(!session.is_locally_owned(&door("A")));

    session.queue_disable_net(false, "lost connection");
    session.update(&mut host);
    assert!(session.is_disabled());
    assert!(session.is_locally_owned(&theirs));
    assert!(session.is_locally_owned(&door("A")));
}

#[test]
fn test_object_ownership() {
    let mut session = new_session();
    let mut host = MockHost::default();
    join_members(&mut session, &mut host, &[1]);

    let shared = door("A");
    let mine = MockHost::avatar_uoid(LOCAL);
    let theirs = MockHost::avatar_uoid(1);
    let orphan = MockHost::avatar_uoid(55);
    assert!(!session.is_locally_owned(&shared));
    assert!(session.is_locally_owned(&mine));
    assert!(!session.is_locally_owned(&theirs));

    deliver(
        &mut session,
        &mut host,
        vec![Message::GroupOwner(GroupOwner { is_owner: true })],
    );
    assert!(session.is_locally_owned(&shared));
    assert!(!session.is_locally_owned(&theirs));
    assert!(session.is_locally_owned(&orphan), "owner inherits orphaned clones");
}

// ---------------------------------------------------------------------------
// Voice
// ---------------------------------------------------------------------------

fn place(host: &mut MockHost, id: PlayerId, x: f32) {
    let avatar = MockHost::avatar_uoid(id);
    if host.resolve(&avatar).is_none() {
        host.add_object(avatar.clone(), true);
    }
    host.move_to(&avatar, Vec3::new(x, 0.0, 0.0));
}

#[test]
fn test_nearest_member_swap_through_update() {
    let mut settings = SessionSettings::default();
    settings.voice.max_list_size = Some(1);
    settings.voice.max_listen_distance_sq = 900.0;
    let mut session = NetClientSession::new(settings, LOCAL);
    let mut host = MockHost::default();
    host.spawn_local_avatar(Vec3::ZERO);
    place(&mut host, 1, 10.0);
    place(&mut host, 2, 40.0);

    join_members(&mut session, &mut host, &[1, 2]);
    assert_eq!(session.voice().listen_list().ids(), &[1]);
    assert_eq!(session.voice().talk_list().ids(), &[1]);

    place(&mut host, 2, 5.0);
    host.advance(2.5);
    session.update(&mut host);
    assert_eq!(session.voice().listen_list().ids(), &[2]);
    assert_eq!(
        session.drain_events(),
        vec![SessionEvent::StopListening(1), SessionEvent::StartListening(2)]
    );
}

#[test]
fn test_voice_send_goes_to_talk_list() {
    let mut session = new_session();
    let mut host = MockHost::default();
    join_members(&mut session, &mut host, &[1]);
    let voice = || {
        Message::Voice(Voice {
            player_id: LOCAL,
            num_frames: 2,
            flags: 0,
            data: vec![9, 9],
            receivers: vec![],
        })
    };

    session.send(voice(), 0.0).unwrap();
    assert!(session.drain_outgoing().is_empty(), "nobody to talk to");

    deliver(
        &mut session,
        &mut host,
        vec![Message::ListenListUpdate(ListenListUpdate {
            player_id: 1,
            adding: true,
            receivers: vec![LOCAL],
        })],
    );
    session.send(voice(), 0.0).unwrap();
    let out = session.drain_outgoing();
    assert_eq!(out[0].channel, NetChannel::Voice);
    let Message::Voice(sent) = &out[0].wire.message else {
        panic!("expected voice");
    };
    assert_eq!(sent.receivers, vec![1]);
}

#[test]
fn test_listen_list_update_subscribes_p2p_receivers() {
    let mut session = new_session();
    let mut host = MockHost::default();
    join_members(&mut session, &mut host, &[1, 2]);
    let mut relayed = member(3);
    relayed.peer_to_peer = false;
    deliver(
        &mut session,
        &mut host,
        vec![Message::MemberUpdate(MemberUpdate {
            adding: true,
            member: relayed,
        })],
    );

    session
        .send(
            Message::ListenListUpdate(ListenListUpdate {
                player_id: LOCAL,
                adding: true,
                receivers: vec![1, 3],
            }),
            0.0,
        )
        .unwrap();
    assert_eq!(session.transport().subscribers(NetChannel::ListenList), vec![1]);
    assert_eq!(session.drain_outgoing()[0].channel, NetChannel::ListenList);
}

#[test]
fn test_incoming_voice_played_on_sender_avatar() {
    let mut session = new_session();
    let mut host = MockHost::default();
    place(&mut host, 1, 3.0);
    place(&mut host, 2, 3.0);
    host.ignore(2);
    join_members(&mut session, &mut host, &[1, 2]);

    let voice = |player_id| {
        Message::Voice(Voice {
            player_id,
            num_frames: 3,
            flags: 1,
            data: vec![4, 5, 6],
            receivers: vec![LOCAL],
        })
    };
    deliver(&mut session, &mut host, vec![voice(1), voice(2), voice(77)]);

    assert_eq!(host.played.len(), 1);
    let played = &host.played[0];
    assert_eq!(Some(played.avatar), host.resolve(&MockHost::avatar_uoid(1)));
    assert_eq!((played.num_frames, played.flags), (3, 1));
    assert!(
        session
            .transport()
            .member(1)
            .unwrap()
            .transport_flags
            .contains(TransportFlags::SENDING_VOICE)
    );
}

#[test]
fn test_forced_list_filters_incoming_voice() {
    let mut session = new_session();
    let mut host = MockHost::default();
    place(&mut host, 1, 3.0);
    place(&mut host, 2, 3.0);
    join_members(&mut session, &mut host, &[1, 2]);

    deliver(
        &mut session,
        &mut host,
        vec![Message::VoiceListCommand(VoiceListCommand::Forced {
            author: 1,
            members: vec![1, LOCAL],
        })],
    );
    assert_eq!(session.voice().mode(), ListenListMode::Forced);
    assert_eq!(session.voice().listen_list().ids(), &[1]);
    assert_eq!(session.drain_events(), vec![SessionEvent::StartListening(1)]);

    let voice = |player_id| {
        Message::Voice(Voice {
            player_id,
            num_frames: 1,
            flags: 0,
            data: vec![1],
            receivers: vec![LOCAL],
        })
    };
    deliver(&mut session, &mut host, vec![voice(1), voice(2)]);
    assert_eq!(host.played.len(), 1);

    deliver(
        &mut session,
        &mut host,
        vec![Message::VoiceListCommand(VoiceListCommand::Distance)],
    );
    assert_eq!(session.voice().mode(), ListenListMode::Distance);
    assert_eq!(session.drain_events(), vec![SessionEvent::StopListening(1)]);
}

fn force_listen_to(session: &mut NetClientSession, host: &mut MockHost, id: PlayerId) {
    deliver(
        session,
        host,
        vec![Message::VoiceListCommand(VoiceListCommand::Forced {
            author: id,
            members: vec![id, LOCAL],
        })],
    );
    assert_eq!(session.drain_events(), vec![SessionEvent::StartListening(id)]);
}

#[test]
fn test_member_leaving_stops_listening() {
    let mut session = new_session();
    let mut host = MockHost::default();
    join_members(&mut session, &mut host, &[1, 2]);
    force_listen_to(&mut session, &mut host, 1);

    deliver(
        &mut session,
        &mut host,
        vec![Message::MemberUpdate(MemberUpdate {
            adding: false,
            member: member(1),
        })],
    );
    assert!(session.voice().listen_list().is_empty());
    let events = session.drain_events();
    assert!(events.contains(&SessionEvent::StopListening(1)));

    deliver(
        &mut session,
        &mut host,
        vec![Message::MemberUpdate(MemberUpdate {
            adding: false,
            member: member(2),
        })],
    );
    assert!(
        !session
            .drain_events()
            .iter()
            .any(|e| matches!(e, SessionEvent::StopListening(_))),
        "2 was never listened to"
    );
}

#[test]
fn test_roster_replacement_stops_listening_to_dropped_members() {
    let mut session = new_session();
    let mut host = MockHost::default();
    join_members(&mut session, &mut host, &[1, 2]);
    force_listen_to(&mut session, &mut host, 1);

    deliver(
        &mut session,
        &mut host,
        vec![Message::MembersList(MembersList {
            members: vec![member(2)],
        })],
    );
    assert!(session.voice().listen_list().is_empty());
    assert!(session.drain_events().contains(&SessionEvent::StopListening(1)));
}

// ---------------------------------------------------------------------------
// Linking
// ---------------------------------------------------------------------------

#[test]
fn test_back_to_back_links_run_one_at_a_time() {
    let mut session = new_session();
    let mut host = MockHost::default();
    session.link_to_age(AgeLink::new("Age1")).unwrap();
    session.link_to_age(AgeLink::new("Age2")).unwrap();

    session.update(&mut host);
    session.update(&mut host);
    assert_eq!(host.joins, vec![AgeLink::new("Age1")]);
    assert!(session.is_loading_initial_state());

    session.age_joined(Ok(()));
    session.update(&mut host);
    assert_eq!(host.leaves, vec![false]);
    assert_eq!(host.joins.len(), 1, "second join waits for the leave");

    session.age_left(Ok(()));
    session.update(&mut host);
    assert_eq!(host.joins, vec![AgeLink::new("Age1"), AgeLink::new("Age2")]);

    let links: Vec<_> = session
        .drain_events()
        .into_iter()
        .filter_map(|e| match e {
            SessionEvent::Link(ev) => Some(ev),
            _ => None,
        })
        .collect();
    assert_eq!(
        links,
        vec![
            LinkEvent::JoinStarted(AgeLink::new("Age1")),
            LinkEvent::Joined(AgeLink::new("Age1")),
            LinkEvent::LeaveStarted { quitting: false },
            LinkEvent::Left,
            LinkEvent::JoinStarted(AgeLink::new("Age2")),
        ]
    );
}

#[test]
fn test_join_timeout_fails_link_and_ignores_late_callback() {
    let mut session = new_session();
    let mut host = MockHost::default();
    session.link_to_age(AgeLink::new("Cleft")).unwrap();
    session.update(&mut host);
    session.drain_events();

    host.advance(session.settings().link_timeout + 1.0);
    session.update(&mut host);
    assert!(!session.is_loading_initial_state());
    assert!(matches!(
        session.drain_events().as_slice(),
        [SessionEvent::Link(LinkEvent::JoinFailed { reason, .. })] if reason == "timed out"
    ));

    session.age_joined(Ok(()));
    assert!(session.drain_events().is_empty());
    assert_eq!(session.linking().state(), LinkState::Idle);
}

#[test]
fn test_banned_player_cannot_link() {
    let mut session = new_session();
    session.set_linking_banned(true);
    assert_eq!(
        session.link_to_age(AgeLink::new("Cleft")),
        Err(LinkError::Banned)
    );
    assert!(session.flags().contains(SessionFlags::BAN_LINKING));
}

#[test]
fn test_leaving_age_unloads_remote_avatars() {
    let mut session = new_session();
    let mut host = MockHost::default();
    join_members(&mut session, &mut host, &[1]);
    session.leave_age(false);
    session.update(&mut host);
    session.age_left(Ok(()));

    let events = session.drain_events();
    assert!(events.contains(&SessionEvent::UnloadRemoteAvatar {
        player_id: 1,
        avatar: MockHost::avatar_uoid(1),
    }));
    assert!(session.transport().is_empty());
}

#[test]
fn test_shutdown_clears_age_state() {
    let mut session = new_session();
    let mut host = MockHost::default();
    join_members(&mut session, &mut host, &[1, 2]);
    session.receive(WireMessage::unstamped(door_state("A", 1, false)));
    session.link_to_age(AgeLink::new("Cleft")).unwrap();

    session.shutdown();
    assert!(session.transport().is_empty());
    assert_eq!(session.inbox_len(), 0);
    assert_eq!(session.linking().queued().count(), 0);
    let unloads = session
        .drain_events()
        .into_iter()
        .filter(|e| matches!(e, SessionEvent::UnloadRemoteAvatar { .. }))
        .count();
    assert_eq!(unloads, 2);
}
