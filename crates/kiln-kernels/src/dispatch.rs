//! Kernel launch: resolve, validate, submit.
//!
//! Submission is asynchronous; a successful return means the driver accepted
//! the work, not that it ran. The store lock is only held while resolving.

use crate::adapter::HipAdapter;
use crate::driver::{Driver, EventHandle, FunctionHandle, LaunchParams, StreamHandle};
use crate::error::KernelError;
use crate::invocation::{GraphInvocation, KernelInvocation, LaunchEvents, LaunchOptions};
use crate::marshal::update_graph_scalars;
use crate::Result;

/// Upper bound on work-items per work-group.
pub const MAX_THREADS_PER_BLOCK: u64 = 1024;

/// Upper bound on dynamic shared (LDS) memory per work-group.
pub const MAX_SHARED_MEMORY_BYTES: u32 = 64 * 1024;

/// Reject launch geometry no device accepts.
pub fn validate(invocation: &KernelInvocation) -> Result<()> {
    let reason = if invocation.grid.is_degenerate() {
        Some(format!("grid {} has a zero extent", invocation.grid))
    } else if invocation.block.is_degenerate() {
        Some(format!("block {} has a zero extent", invocation.block))
    } else if invocation.block.volume() > MAX_THREADS_PER_BLOCK {
        Some(format!(
            "block {} exceeds {} threads",
            invocation.block, MAX_THREADS_PER_BLOCK
        ))
    } else if invocation.shared_memory_bytes > MAX_SHARED_MEMORY_BYTES {
        Some(format!(
            "{} bytes of shared memory exceeds {}",
            invocation.shared_memory_bytes, MAX_SHARED_MEMORY_BYTES
        ))
    } else {
        None
    };
    match reason {
        Some(reason) => Err(KernelError::InvalidLaunch {
            kernel: invocation.kernel_name.clone(),
            reason,
        }),
        None => Ok(()),
    }
}

fn launch_error(invocation: &KernelInvocation, status: crate::error::DriverStatus) -> KernelError {
    KernelError::Launch {
        kernel: invocation.kernel_name.clone(),
        status,
    }
}

fn record<D: Driver>(driver: &D, event: EventHandle, stream: StreamHandle) -> Result<()> {
    driver
        .record_event(event, stream)
        .map_err(|status| KernelError::Driver {
            status,
            context: "hipEventRecord".into(),
        })
}

impl<D: Driver> HipAdapter<D> {
    /// Resolve a kernel ahead of its first launch so the launch path only
    /// takes a cache hit.
    pub fn init_kernel(&self, kernel_name: &str) -> Result<()> {
        self.resolve_kernel(kernel_name).map(|_| ())
    }

    /// Launch one kernel.
    ///
    /// With `graph`, the launch goes through a captured executable graph:
    /// captured on first use, its node parameters updated (with "alpha" and
    /// "beta" re-marshaled) on every later use.
    pub fn launch_kernel_with(
        &self,
        invocation: &KernelInvocation,
        options: &LaunchOptions,
        mut graph: Option<&mut GraphInvocation>,
    ) -> Result<()> {
        let function = self.resolve_kernel(&invocation.kernel_name)?;
        validate(invocation)?;

        if self.debug_skip_launch {
            tracing::debug!("skip-launch: not submitting {}", invocation.kernel_name);
            return Ok(());
        }

        // Marshal before any event is recorded so a bad scalar leaves the
        // stream untouched.
        if let Some(graph) = graph.as_deref_mut() {
            update_graph_scalars(graph)?;
        }

        let driver = self.store.driver().as_ref();
        if let Some(start) = options.start_event {
            record(driver, start, options.stream)?;
        }

        match graph {
            Some(graph) => self.submit_graph(function, invocation, graph, options.stream)?,
            None => {
                let params = LaunchParams {
                    grid: invocation.grid,
                    block: invocation.block,
                    shared_memory_bytes: invocation.shared_memory_bytes,
                    args: invocation.args.as_bytes(),
                };
                tracing::debug!(
                    "launching {} grid={} block={} lds={} args={}B",
                    invocation.kernel_name,
                    invocation.grid,
                    invocation.block,
                    invocation.shared_memory_bytes,
                    invocation.args.len()
                );
                driver
                    .launch_kernel(function, &params, options.stream)
                    .map_err(|status| launch_error(invocation, status))?;
            }
        }

        if let Some(stop) = options.stop_event {
            record(driver, stop, options.stream)?;
        }
        Ok(())
    }

    fn submit_graph(
        &self,
        function: FunctionHandle,
        invocation: &KernelInvocation,
        graph: &mut GraphInvocation,
        stream: StreamHandle,
    ) -> Result<()> {
        let driver = self.store.driver().as_ref();
        let args = graph
            .kernel_args
            .as_deref()
            .ok_or(KernelError::ArgumentsReleased)?;
        let params = LaunchParams {
            grid: invocation.grid,
            block: invocation.block,
            shared_memory_bytes: invocation.shared_memory_bytes,
            args: args.as_bytes(),
        };

        let exec = match graph.exec.take() {
            Some(exec) => {
                if let Err(status) = driver.update_graph(&exec, function, &params) {
                    graph.exec = Some(exec);
                    return Err(launch_error(invocation, status));
                }
                exec
            }
            None => {
                let exec = driver
                    .capture_graph(function, &params, stream)
                    .map_err(|status| launch_error(invocation, status))?;
                tracing::debug!("captured launch graph for {}", invocation.kernel_name);
                exec
            }
        };
        let exec = graph.exec.insert(exec);
        driver
            .launch_graph(exec, stream)
            .map_err(|status| launch_error(invocation, status))
    }

    /// Submit a batch in order on one stream.
    ///
    /// Stops at the first failure and returns it; launches already submitted
    /// stay submitted. An empty batch records no events.
    pub fn launch_batch(
        &self,
        invocations: &[KernelInvocation],
        stream: StreamHandle,
        events: &LaunchEvents,
    ) -> Result<()> {
        if let LaunchEvents::PerKernel { starts, stops } = events {
            if starts.len() != invocations.len() || stops.len() != invocations.len() {
                return Err(KernelError::InvalidLaunch {
                    kernel: "<batch>".into(),
                    reason: format!(
                        "{} kernels but {} start and {} stop events",
                        invocations.len(),
                        starts.len(),
                        stops.len()
                    ),
                });
            }
        }

        let last = invocations.len().saturating_sub(1);
        for (i, invocation) in invocations.iter().enumerate() {
            let mut options = LaunchOptions::on_stream(stream);
            match events {
                LaunchEvents::None => {}
                LaunchEvents::Bracket { start, stop } => {
                    if i == 0 {
                        options.start_event = Some(*start);
                    }
                    if i == last {
                        options.stop_event = Some(*stop);
                    }
                }
                LaunchEvents::PerKernel { starts, stops } => {
                    options.start_event = Some(starts[i]);
                    options.stop_event = Some(stops[i]);
                }
            }
            tracing::trace!(
                "batch {}/{}: {}",
                i + 1,
                invocations.len(),
                invocation.kernel_name
            );
            self.launch_kernel_with(invocation, &options, None)?;
        }
        Ok(())
    }

    /// Destroy the captured graph (if any) and release the argument buffer.
    pub fn release_graph(&self, graph: &mut GraphInvocation) -> Result<()> {
        let destroyed = match graph.exec.take() {
            Some(exec) => self
                .store
                .driver()
                .destroy_graph(exec)
                .map_err(|status| KernelError::Driver {
                    status,
                    context: "hipGraphExecDestroy".into(),
                }),
            None => Ok(()),
        };
        graph.release_kernel_args();
        destroyed
    }
}
