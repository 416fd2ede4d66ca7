use std::sync::Arc;

use wgpu::util::DeviceExt;

use crate::analysis::AnalyzedStencil;
use crate::backend::{Backend, BuildOptions, Kernel, Launch};
use crate::error::{BackendCompilationError, Error, StorageError};
use crate::ir::{Interval, IterationPolicy};

use super::codegen::{self, FIELD_BINDING_BASE};
use super::{GpuBuffer, GpuContext};

/// Pipelines of one computation block, one per pass.
struct BlockPipelines {
    policy: IterationPolicy,
    interval: Interval,
    passes: Vec<wgpu::ComputePipeline>,
}

pub(crate) struct GpuKernel {
    context: Arc<GpuContext>,
    stencil: Arc<AnalyzedStencil>,
    layout: wgpu::BindGroupLayout,
    blocks: Vec<BlockPipelines>,
    workgroup: [u32; 2],
    scalar_slots: usize,
}

impl GpuKernel {
    pub fn new(
        stencil: &Arc<AnalyzedStencil>,
        source: &str,
        options: &BuildOptions,
    ) -> Result<Self, BackendCompilationError> {
        let fail = |msg: String| BackendCompilationError::new(Backend::Gpu, msg);
        let context = super::shared_context().ok_or_else(|| fail("no GPU adapter found".into()))?;
        let device = &context.device;

        let field_count = stencil.fields.len() as u32;
        let max_buffers = device.limits().max_storage_buffers_per_shader_stage;
        if field_count > max_buffers {
            return Err(fail(format!(
                "stencil binds {} fields, the device allows {} storage buffers per shader",
                field_count, max_buffers
            )));
        }

        let mut entries = vec![uniform_entry(0), uniform_entry(1)];
        for (f, field) in stencil.fields.iter().enumerate() {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: FIELD_BINDING_BASE + f as u32,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage {
                        read_only: !field.intent.is_written(),
                    },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            });
        }

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("tessera_layout"),
            entries: &entries,
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("tessera_pipeline_layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(stencil.name()),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });

        let mut blocks = Vec::with_capacity(stencil.blocks.len());
        for (b, block) in stencil.blocks.iter().enumerate() {
            let passes = (0..block.passes.len())
                .map(|p| {
                    let entry = codegen::entry_point_name(b, p);
                    device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                        label: Some(entry.as_str()),
                        layout: Some(&pipeline_layout),
                        module: &module,
                        entry_point: Some(entry.as_str()),
                        compilation_options: Default::default(),
                        cache: None,
                    })
                })
                .collect();
            blocks.push(BlockPipelines {
                policy: block.policy,
                interval: block.interval,
                passes,
            });
        }
        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(fail(format!("shader validation failed: {}", err)));
        }

        tracing::debug!(
            stencil = stencil.name(),
            adapter = %context.adapter_name,
            pipelines = blocks.iter().map(|b| b.passes.len()).sum::<usize>(),
            "created GPU pipelines"
        );

        Ok(Self {
            context: context.clone(),
            stencil: stencil.clone(),
            layout,
            blocks,
            workgroup: options.workgroup,
            scalar_slots: codegen::scalar_slots(stencil.definition.scalars().count()),
        })
    }

    /// Uniform contents for a dispatch starting at level `k_base`.
    fn geometry(&self, launch: &Launch<'_>, k_base: usize) -> Vec<i32> {
        let [ni, nj, nk] = launch.domain;
        let mut words = vec![ni as i32, nj as i32, nk as i32, k_base as i32];
        for arg in &launch.fields {
            let strides = arg.storage.strides();
            words.extend([
                arg.origin[0] as i32,
                arg.origin[1] as i32,
                arg.origin[2] as i32,
                strides[0] as i32,
            ]);
            words.extend([strides[1] as i32, 0, 0, 0]);
        }
        words
    }
}

fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

impl Kernel for GpuKernel {
    fn launch(&self, launch: &mut Launch<'_>) -> Result<(), Error> {
        let device = &self.context.device;
        let queue = &self.context.queue;
        let [ni, nj, nk] = launch.domain;
        if ni == 0 || nj == 0 || nk == 0 {
            return Ok(());
        }

        let mut scalars: Vec<f32> = launch.scalars.iter().map(|&v| v as f32).collect();
        scalars.resize(self.scalar_slots * 4, 0.0);
        let scalar_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("tessera_scalars"),
            contents: bytemuck::cast_slice(&scalars),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let geometry = self.geometry(launch, 0);
        let geom_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("tessera_geometry"),
            contents: bytemuck::cast_slice(&geometry),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let mut entries = vec![
            wgpu::BindGroupEntry {
                binding: 0,
                resource: geom_buf.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: scalar_buf.as_entire_binding(),
            },
        ];
        for (f, arg) in launch.fields.iter().enumerate() {
            let buffer = arg
                .storage
                .device_buffer()
                .and_then(|b| b.as_any().downcast_ref::<GpuBuffer>())
                .ok_or_else(|| {
                    StorageError::DeviceUnavailable(format!(
                        "field '{}' has no GPU copy; allocate it for the gpu backend",
                        self.stencil.fields[f].name
                    ))
                })?;
            entries.push(wgpu::BindGroupEntry {
                binding: FIELD_BINDING_BASE + f as u32,
                resource: buffer.buffer().as_entire_binding(),
            });
        }
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("tessera_bind_group"),
            layout: &self.layout,
            entries: &entries,
        });

        let [wx, wy] = self.workgroup;
        let groups_x = (ni as u32).div_ceil(wx);
        let groups_y = (nj as u32).div_ceil(wy);

        let dispatch = |k_base: usize, depth: u32, pipeline: &wgpu::ComputePipeline| {
            let geometry = self.geometry(launch, k_base);
            queue.write_buffer(&geom_buf, 0, bytemuck::cast_slice(&geometry));
            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("tessera_encoder"),
            });
            {
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some("tessera_pass"),
                    timestamp_writes: None,
                });
                pass.set_pipeline(pipeline);
                pass.set_bind_group(0, &bind_group, &[]);
                pass.dispatch_workgroups(groups_x, groups_y, depth);
            }
            queue.submit(std::iter::once(encoder.finish()));
        };

        for block in &self.blocks {
            let (lo, hi) = block.interval.resolve(nk);
            if hi <= lo {
                continue;
            }
            match block.policy {
                IterationPolicy::Parallel => {
                    for pipeline in &block.passes {
                        dispatch(lo, (hi - lo) as u32, pipeline);
                    }
                }
                IterationPolicy::Forward => {
                    for k in lo..hi {
                        for pipeline in &block.passes {
                            dispatch(k, 1, pipeline);
                        }
                    }
                }
                IterationPolicy::Backward => {
                    for k in (lo..hi).rev() {
                        for pipeline in &block.passes {
                            dispatch(k, 1, pipeline);
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
