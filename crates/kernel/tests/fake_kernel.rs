#![allow(dead_code)]

use bytes::Bytes;
use serde_json::{json, Value};
use sluice_kernel::{connection::ConnectionInfo, message::Signer, KernelMessage};
use tokio::task::{self, JoinHandle};
use zeromq::{PubSocket, RouterSocket, Socket, SocketRecv, SocketSend, ZmqMessage};

const SESSION: &str = "fake-kernel";

/// The kernel side of the Jupyter channels, bound on the ports of a
/// connection file. When answering, it replies to `kernel_info_request`
/// and runs `execute_request` by echoing the code back as the result.
pub struct FakeKernel {
    task: JoinHandle<()>,
}

impl FakeKernel {
    pub async fn bind(info: &ConnectionInfo, answering: bool) -> Self {
        let mut shell = RouterSocket::new();
        shell.bind(&info.endpoint(info.shell_port)).await.unwrap();
        let mut control = RouterSocket::new();
        control.bind(&info.endpoint(info.control_port)).await.unwrap();
        let mut iopub = PubSocket::new();
        iopub.bind(&info.endpoint(info.iopub_port)).await.unwrap();

        let signer = info.signer();
        let task = task::spawn(async move {
            let _control = control;
            let mut exec_count = 0;

            loop {
                let frames: Vec<Bytes> = shell.recv().await.unwrap().into_vecdeque().into();
                if !answering {
                    continue;
                }
                let identity = frames[0].clone();
                let request = KernelMessage::from_frames(frames, &signer).unwrap();

                match request.msg_type() {
                    "kernel_info_request" => {
                        let reply = reply_to(&request, "kernel_info_reply", json!({ "status": "ok" }));
                        send(&mut shell, Some(&identity), &reply, &signer).await;
                        let idle = reply_to(&request, "status", json!({ "execution_state": "idle" }));
                        send(&mut iopub, None, &idle, &signer).await;
                    }
                    "execute_request" => {
                        exec_count += 1;
                        let code = request.content["code"].clone();
                        for (msg_type, content) in [
                            ("status", json!({ "execution_state": "busy" })),
                            (
                                "execute_result",
                                json!({ "data": { "text/plain": code }, "metadata": {}, "execution_count": exec_count }),
                            ),
                            ("status", json!({ "execution_state": "idle" })),
                        ] {
                            send(&mut iopub, None, &reply_to(&request, msg_type, content), &signer).await;
                        }
                        let reply = reply_to(
                            &request,
                            "execute_reply",
                            json!({ "status": "ok", "execution_count": exec_count }),
                        );
                        send(&mut shell, Some(&identity), &reply, &signer).await;
                    }
                    _ => {}
                }
            }
        });

        Self { task }
    }
}

impl Drop for FakeKernel {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn reply_to(request: &KernelMessage, msg_type: &str, content: Value) -> KernelMessage {
    KernelMessage::new(SESSION, msg_type, content).with_parent(&request.header)
}

async fn send<S: SocketSend>(
    socket: &mut S,
    identity: Option<&Bytes>,
    message: &KernelMessage,
    signer: &Signer,
) {
    let mut frames: Vec<Bytes> = identity.into_iter().cloned().collect();
    frames.extend(message.to_frames(signer).unwrap());
    socket.send(ZmqMessage::try_from(frames).unwrap()).await.unwrap();
}
