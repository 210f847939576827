use log::{debug, info};

use snapsync_shared::{
    ByteReader, ChangeOwnershipMessage, ClientId, ConnectionApprovedMessage,
    ConnectionRequestMessage, DestroyObjectMessage, MessageDispatch, MessageType,
    ParentSyncMessage, Serde, SERVER_CLIENT_ID,
};

use crate::{connection::ConnectionState, error::ManagerError, manager::manager_state::ManagerState};

pub(crate) type Dispatch = MessageDispatch<ManagerState, ManagerError>;

/// Messages a server accepts from its clients
pub(crate) fn server_dispatch() -> Dispatch {
    let mut dispatch = Dispatch::new();
    dispatch.register(MessageType::ConnectionRequest, handle_connection_request);
    dispatch.register(MessageType::Snapshot, handle_snapshot);
    dispatch.register(MessageType::VariableDelta, handle_variable_delta);
    dispatch
}

/// Messages a client accepts from the server
pub(crate) fn client_dispatch() -> Dispatch {
    let mut dispatch = Dispatch::new();
    dispatch.register(MessageType::ConnectionApproved, handle_connection_approved);
    dispatch.register(MessageType::Snapshot, handle_snapshot);
    dispatch.register(MessageType::CreateObject, handle_create_object);
    dispatch.register(MessageType::DestroyObject, handle_destroy_object);
    dispatch.register(MessageType::ChangeOwnership, handle_change_ownership);
    dispatch.register(MessageType::ParentSync, handle_parent_sync);
    dispatch.register(MessageType::VariableDelta, handle_variable_delta);
    dispatch
}

// Connection

fn handle_connection_request(
    state: &mut ManagerState,
    sender: ClientId,
    reader: &mut ByteReader,
) -> Result<(), ManagerError> {
    let request = ConnectionRequestMessage::de(reader)?;
    state.connections.try_advance(
        sender,
        ConnectionState::PendingConnection,
        ConnectionState::PendingApproval,
    )?;
    if state.config.require_approval {
        debug!("client {} waits for approval", sender);
        state.events.push_approval_request(sender, request.payload);
        return Ok(());
    }
    state.approve_client(sender)
}

fn handle_connection_approved(
    state: &mut ManagerState,
    _sender: ClientId,
    reader: &mut ByteReader,
) -> Result<(), ManagerError> {
    let approved = ConnectionApprovedMessage::de(reader)?;
    state.connections.try_advance(
        SERVER_CLIENT_ID,
        ConnectionState::PendingApproval,
        ConnectionState::Connected,
    )?;
    state.directory.set_local_client(approved.client_id);
    state.clock.reset(approved.server_tick);
    state.snapshot.set_tick(approved.server_tick);
    state.events.push_connection(approved.client_id);
    info!(
        "approved as client {} at server tick {}",
        approved.client_id, approved.server_tick
    );
    Ok(())
}

// Replication

fn handle_snapshot(
    state: &mut ManagerState,
    sender: ClientId,
    reader: &mut ByteReader,
) -> Result<(), ManagerError> {
    let receipt = state
        .snapshot
        .handle_snapshot(sender, reader, &mut state.directory, state.now)?;
    if state.is_server && !receipt.acknowledged_spawns.is_empty() {
        let (directory, mut ctx) = state.replication();
        directory.confirm_spawns(sender, &receipt.acknowledged_spawns, &mut ctx);
    }
    Ok(())
}

fn handle_create_object(
    state: &mut ManagerState,
    sender: ClientId,
    reader: &mut ByteReader,
) -> Result<(), ManagerError> {
    state
        .directory
        .handle_create_object(sender, reader, &mut state.snapshot, &state.replicator)?;
    Ok(())
}

fn handle_destroy_object(
    state: &mut ManagerState,
    sender: ClientId,
    reader: &mut ByteReader,
) -> Result<(), ManagerError> {
    let message = DestroyObjectMessage::de(reader)?;
    state
        .directory
        .handle_destroy_object(sender, &message, &mut state.snapshot);
    Ok(())
}

fn handle_change_ownership(
    state: &mut ManagerState,
    _sender: ClientId,
    reader: &mut ByteReader,
) -> Result<(), ManagerError> {
    let message = ChangeOwnershipMessage::de(reader)?;
    state.directory.handle_change_ownership(&message)?;
    Ok(())
}

fn handle_parent_sync(
    state: &mut ManagerState,
    _sender: ClientId,
    reader: &mut ByteReader,
) -> Result<(), ManagerError> {
    let message = ParentSyncMessage::de(reader)?;
    state.directory.handle_parent_sync(&message)?;
    Ok(())
}

fn handle_variable_delta(
    state: &mut ManagerState,
    sender: ClientId,
    reader: &mut ByteReader,
) -> Result<(), ManagerError> {
    let changed = state
        .directory
        .handle_variable_delta(sender, reader, &state.replicator)?;
    debug!("applied {} fields from client {}", changed, sender);
    Ok(())
}
