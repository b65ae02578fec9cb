//! # Prios Example Firmware
//!
//! Boots the kernel with four threads that exercise every primitive:
//!
//! | Thread | Priority | Behavior |
//! |--------|----------|----------|
//! | `producer` | 3 | Produces an item every `arg` × 50 ms and posts `ITEMS` |
//! | `consumer` | 2 | Pends on `ITEMS`, then updates `TOTAL` under `LOCK` |
//! | `auditor` | 1 | Every 200 ms reads `TOTAL` under `LOCK` |
//! | `background` | 6 | Never blocks; runs only when the others wait |
//!
//! ## Expected Dynamics
//!
//! 1. The auditor (most urgent) runs first and goes to sleep.
//! 2. The consumer blocks on the empty semaphore; the producer runs, posts,
//!    and is preempted by the consumer it woke.
//! 3. If the auditor wakes while the consumer holds `LOCK`, the consumer
//!    inherits priority 1 until it unlocks.
//! 4. Whenever all three sleep or block, `background` soaks up the CPU,
//!    preempted every time slice; the idle thread only runs if it blocks.

#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]

#[cfg(target_os = "none")]
mod firmware {
    use core::sync::atomic::{AtomicU32, Ordering};

    use cortex_m_rt::entry;
    use panic_halt as _;

    use prios::arch::cortex_m4;
    use prios::config::STACK_POOL_SIZE;
    use prios::kernel::RTOS;
    use prios::{logger, Mutex, Semaphore, ThreadConfig};

    static ITEMS: Semaphore = Semaphore::new(0);
    static LOCK: Mutex = Mutex::new();
    static TOTAL: AtomicU32 = AtomicU32::new(0);

    extern "C" fn producer(period: usize) -> ! {
        loop {
            RTOS.delay_ms(50 * period as u32);
            ITEMS.post(&RTOS);
        }
    }

    extern "C" fn consumer(step: usize) -> ! {
        loop {
            ITEMS.pend(&RTOS);
            LOCK.lock(&RTOS);
            TOTAL.fetch_add(step as u32, Ordering::Relaxed);
            LOCK.unlock(&RTOS);
        }
    }

    extern "C" fn auditor(_: usize) -> ! {
        loop {
            RTOS.delay_ms(200);
            LOCK.lock(&RTOS);
            log::info!("total = {}", TOTAL.load(Ordering::Relaxed));
            LOCK.unlock(&RTOS);
        }
    }

    extern "C" fn background(_: usize) -> ! {
        let mut counter: u32 = 0;
        loop {
            counter = counter.wrapping_add(1);
        }
    }

    /// Firmware entry point. Initializes the kernel, creates threads, and
    /// starts the scheduler. Does not return.
    #[entry]
    fn main() -> ! {
        let cp = cortex_m::Peripherals::take().unwrap();

        let channels = rtt_target::rtt_init_default!();
        logger::init(channels.up.0, log::LevelFilter::Info);

        let region = cortex_m::singleton!(: [u32; STACK_POOL_SIZE / 4] = [0; STACK_POOL_SIZE / 4]).unwrap();
        RTOS.init(region).expect("Failed to initialize kernel");

        RTOS.create_thread(producer, 1, 3).expect("Failed to create producer");
        RTOS.create_thread(consumer, 1, 2).expect("Failed to create consumer");
        RTOS.create_thread(auditor, 0, 1).expect("Failed to create auditor");
        RTOS.spawn(background, 0, ThreadConfig { priority: 6, time_slice: 5 })
            .expect("Failed to create background");

        cortex_m4::start(cp)
    }
}

#[cfg(not(target_os = "none"))]
fn main() {
    eprintln!("prios firmware targets thumbv7em-none-eabi; run `cargo test` for the host build");
}
