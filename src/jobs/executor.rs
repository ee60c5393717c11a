//! Worker pool and concurrent dispatch entry point
//!
//! The executor is an explicit, caller-owned resource: created before
//! the first concurrent pass, shut down at subsystem teardown when no
//! tasks are outstanding. Nothing here is process-global.

use crate::core::error::Error;
use crate::core::types::Result;
use crate::scene::index::SceneIndex;
use crate::visibility::backend::{OcclusionQuery, SubmitSink};
use crate::visibility::camera::CullCamera;
use crate::visibility::pass::{
    scan_node_content, submit_output, walk_nodes, NodeJob, OcclusionOutput, PassInfo,
};
use crate::visibility::sorter::RendSorter;

use super::queue::{JobQueue, OutputQueue};

/// Worker pool for node-content scan tasks
pub struct CullExecutor {
    pool: rayon::ThreadPool,
    workers: usize,
}

impl CullExecutor {
    /// Build a pool of `workers` threads.
    ///
    /// At least two: one thread drives the walk and consumes results,
    /// the rest scan node content.
    pub fn new(workers: usize) -> Result<Self> {
        let workers = workers.max(2);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("cull-{i}"))
            .build()
            .map_err(|e| Error::Dispatch(e.to_string()))?;
        Ok(Self { pool, workers })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Tear the pool down. Must only be called when no concurrent pass
    /// is in flight; [`run_concurrent`] itself never leaves tasks
    /// outstanding.
    pub fn shutdown(self) {
        drop(self.pool);
    }
}

/// The bounded queue pair for one consumer, reused across frames
pub struct CullQueues {
    pub jobs: JobQueue<NodeJob>,
    pub output: OutputQueue<OcclusionOutput>,
}

impl CullQueues {
    pub fn new(job_capacity: usize, output_capacity: usize) -> Self {
        Self {
            jobs: JobQueue::new(job_capacity),
            output: OutputQueue::new(output_capacity),
        }
    }
}

/// Concurrent visibility pass.
///
/// The caller thread walks the octree (all tree mutation happens
/// there), queues one job per renderable node, then becomes the single
/// consumer of the output queue, submitting results in order until the
/// last producer has drained. Worker tasks scan node content read-only
/// and classify into the output queue; one task covers all buckets of
/// one node.
///
/// Queue overflow blocks the pushing side, so the queues must be sized
/// for the worst-case nodes- and objects-per-frame of the scene.
pub fn run_concurrent<O, S>(
    scene: &mut SceneIndex,
    camera: &CullCamera,
    info: &PassInfo,
    executor: &CullExecutor,
    queues: &CullQueues,
    occlusion: &O,
    sink: &mut S,
) where
    O: OcclusionQuery + Sync,
    S: SubmitSink + Send,
{
    // phase 1: cull nodes and snapshot jobs on the caller thread
    let mut jobs = Vec::new();
    let mut sorter = RendSorter::new();
    let root = scene.root();
    walk_nodes(
        scene,
        root,
        false,
        camera,
        info,
        occlusion,
        &mut sorter,
        &mut |_, job| jobs.push(job),
    );

    // phase 2: workers classify, this thread consumes in order; one
    // pool thread is occupied by this scope body
    let scene_ref: &SceneIndex = scene;
    executor.pool.scope(|s| {
        for _ in 0..executor.workers - 1 {
            s.spawn(|_| {
                while let Some(job) = queues.jobs.pop() {
                    scan_node_content(scene_ref, camera, occlusion, &job, &mut |out| {
                        queues.output.push(out)
                    });
                    queues.output.remove_producer();
                }
            });
        }

        // a producer is registered per job before it is queued, so the
        // consumer can never observe a false idle between jobs
        for job in jobs.drain(..) {
            queues.output.add_producer();
            queues.jobs.push(job);
        }
        queues.jobs.close();

        while let Some(out) = queues.output.pop_until_idle() {
            submit_output(sink, &out);
        }
    });

    queues.jobs.reopen();
}
