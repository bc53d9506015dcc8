//! WebRTC peer session.
//!
//! Two data channels to one peer: `assets` (reliable, ordered) and `live`
//! (unordered, zero retransmits). Session descriptions are exchanged by
//! hand: the offering side produces an SDP string for the operator to
//! paste on the other side, and vice versa. The local description is
//! surfaced once ICE gathering settles, so the pasted string already
//! carries the candidates.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use js_sys::{Array, ArrayBuffer, Uint8Array};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::{spawn_local, JsFuture};
use web_sys::{
    MessageEvent, RtcConfiguration, RtcDataChannel, RtcDataChannelEvent, RtcDataChannelInit,
    RtcDataChannelType, RtcIceGatheringState, RtcIceServer, RtcPeerConnection, RtcSdpType,
    RtcSessionDescriptionInit,
};

use crate::assets::LOW_WATER;
use crate::transport::ChannelSlot;
use crate::Runtime;

pub const ASSET_LABEL: &str = "assets";
pub const LIVE_LABEL: &str = "live";

pub struct PeerSession {
    pc: RtcPeerConnection,
    assets: ChannelSlot,
    live: ChannelSlot,
    runtime: Rc<RefCell<Runtime>>,
    offered: Cell<bool>,
    on_local_description: Rc<RefCell<Option<js_sys::Function>>>,
}

impl PeerSession {
    pub fn new(
        stun_url: &str,
        runtime: Rc<RefCell<Runtime>>,
        assets: ChannelSlot,
        live: ChannelSlot,
    ) -> Result<Self, JsValue> {
        let ice_server = RtcIceServer::new();
        ice_server.set_urls(&JsValue::from_str(stun_url));
        let config = RtcConfiguration::new();
        config.set_ice_servers(&Array::of1(&ice_server));
        let pc = RtcPeerConnection::new_with_configuration(&config)?;

        let session = Self {
            pc,
            assets,
            live,
            runtime,
            offered: Cell::new(false),
            on_local_description: Rc::new(RefCell::new(None)),
        };
        session.watch_gathering();
        session.watch_incoming_channels();
        Ok(session)
    }

    /// Register the callback that receives the pasteable local SDP.
    pub fn set_on_local_description(&self, callback: js_sys::Function) {
        *self.on_local_description.borrow_mut() = Some(callback);
    }

    /// Local description so far, if gathering already settled.
    pub fn local_description(&self) -> Option<String> {
        self.pc.local_description().map(|d| d.sdp())
    }

    /// Offering side: create both channels and produce an offer.
    pub fn offer(&self) {
        self.offered.set(true);

        let assets = self.pc.create_data_channel(ASSET_LABEL);
        wire_channel(&self.runtime, &assets, true);
        self.assets.install(assets);

        let live_init = RtcDataChannelInit::new();
        live_init.set_ordered(false);
        live_init.set_max_retransmits(0);
        let live = self
            .pc
            .create_data_channel_with_data_channel_dict(LIVE_LABEL, &live_init);
        wire_channel(&self.runtime, &live, false);
        self.live.install(live);

        let pc = self.pc.clone();
        spawn_local(async move {
            let result = async {
                let offer = JsFuture::from(pc.create_offer()).await?;
                JsFuture::from(
                    pc.set_local_description(offer.unchecked_ref::<RtcSessionDescriptionInit>()),
                )
                .await
            }
            .await;
            if let Err(err) = result {
                tracing::error!(?err, "offer negotiation failed");
            }
        });
    }

    /// Consume the string pasted from the remote peer: an answer if this
    /// side offered, otherwise an offer to answer.
    pub fn accept_remote(&self, sdp: String) {
        let pc = self.pc.clone();
        if self.offered.get() {
            spawn_local(async move {
                let desc = RtcSessionDescriptionInit::new(RtcSdpType::Answer);
                desc.set_sdp(&sdp);
                if let Err(err) = JsFuture::from(pc.set_remote_description(&desc)).await {
                    tracing::error!(?err, "applying remote answer failed");
                }
            });
        } else {
            spawn_local(async move {
                let result = async {
                    let desc = RtcSessionDescriptionInit::new(RtcSdpType::Offer);
                    desc.set_sdp(&sdp);
                    JsFuture::from(pc.set_remote_description(&desc)).await?;
                    let answer = JsFuture::from(pc.create_answer()).await?;
                    JsFuture::from(
                        pc.set_local_description(
                            answer.unchecked_ref::<RtcSessionDescriptionInit>(),
                        ),
                    )
                    .await
                }
                .await;
                if let Err(err) = result {
                    tracing::error!(?err, "answering remote offer failed");
                }
            });
        }
    }

    /// Surface the local SDP once ICE gathering completes.
    fn watch_gathering(&self) {
        let pc = self.pc.clone();
        let sink = self.on_local_description.clone();
        let on_change = Closure::<dyn FnMut()>::new(move || {
            if pc.ice_gathering_state() != RtcIceGatheringState::Complete {
                return;
            }
            let Some(desc) = pc.local_description() else {
                return;
            };
            tracing::info!("ICE gathering complete, local description ready");
            if let Some(callback) = sink.borrow().as_ref() {
                let _ = callback.call1(&JsValue::NULL, &JsValue::from_str(&desc.sdp()));
            }
        });
        self.pc
            .set_onicegatheringstatechange(Some(on_change.as_ref().unchecked_ref()));
        // The connection owns the handler for the session's lifetime.
        on_change.forget();
    }

    /// Answering side: adopt the channels the offerer created.
    fn watch_incoming_channels(&self) {
        let assets_slot = self.assets.clone();
        let live_slot = self.live.clone();
        let runtime = self.runtime.clone();
        let on_channel = Closure::<dyn FnMut(RtcDataChannelEvent)>::new(
            move |event: RtcDataChannelEvent| {
                let channel = event.channel();
                match channel.label().as_str() {
                    ASSET_LABEL => {
                        wire_channel(&runtime, &channel, true);
                        assets_slot.install(channel);
                    }
                    LIVE_LABEL => {
                        wire_channel(&runtime, &channel, false);
                        live_slot.install(channel);
                    }
                    other => {
                        tracing::warn!(label = other, "unexpected data channel ignored");
                    }
                }
            },
        );
        self.pc
            .set_ondatachannel(Some(on_channel.as_ref().unchecked_ref()));
        on_channel.forget();
    }
}

fn wire_channel(runtime: &Rc<RefCell<Runtime>>, channel: &RtcDataChannel, is_assets: bool) {
    channel.set_binary_type(RtcDataChannelType::Arraybuffer);

    let on_open = {
        let runtime = runtime.clone();
        let label = channel.label();
        Closure::<dyn FnMut()>::new(move || {
            tracing::info!(label = %label, "data channel open");
            runtime.borrow_mut().on_channel_open();
        })
    };
    channel.set_onopen(Some(on_open.as_ref().unchecked_ref()));
    on_open.forget();

    let on_message = {
        let runtime = runtime.clone();
        Closure::<dyn FnMut(MessageEvent)>::new(move |event: MessageEvent| {
            let Ok(buffer) = event.data().dyn_into::<ArrayBuffer>() else {
                tracing::warn!("non-binary frame ignored");
                return;
            };
            let bytes = Uint8Array::new(&buffer).to_vec();
            let mut runtime = runtime.borrow_mut();
            if is_assets {
                runtime.on_asset_frame(&bytes);
            } else {
                runtime.on_live_frame(&bytes);
            }
        })
    };
    channel.set_onmessage(Some(on_message.as_ref().unchecked_ref()));
    on_message.forget();

    if is_assets {
        channel.set_buffered_amount_low_threshold(LOW_WATER as u32);
        let on_low = {
            let runtime = runtime.clone();
            Closure::<dyn FnMut()>::new(move || {
                runtime.borrow_mut().on_buffered_low();
            })
        };
        channel.set_onbufferedamountlow(Some(on_low.as_ref().unchecked_ref()));
        on_low.forget();
    }
}

impl Drop for PeerSession {
    fn drop(&mut self) {
        // Disposing the transport also cancels any pending
        // buffered-amount-low wait.
        self.assets.close();
        self.live.close();
        self.pc.close();
    }
}
